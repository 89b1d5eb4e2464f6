use super::matrix::IntensityMatrix;
use super::spectrum::Spectrum;
use crate::params::ProcessingParameters;

/// Synthetic result set for the "use demo data" button.
#[derive(Debug, Clone)]
pub struct DemoData {
    pub train: IntensityMatrix,
    pub validation: Option<IntensityMatrix>,
    pub spectrum: Spectrum,
    pub params: ProcessingParameters,
}

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range_u64(&mut self, lo: u64, hi: u64) -> u64 {
        lo + self.next_u64() % (hi - lo)
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    fn exponential(&mut self, scale: f64) -> f64 {
        -scale * (1.0 - self.next_f64()).max(1e-15).ln()
    }
}

fn random_matrix(
    rng: &mut SimpleRng,
    features: &[String],
    prefix: &str,
    n: usize,
) -> IntensityMatrix {
    let row_ids: Vec<String> = (1..=n).map(|i| format!("{prefix}_{i}")).collect();
    let values = (0..n)
        .map(|_| features.iter().map(|_| rng.exponential(100.0)).collect())
        .collect();
    IntensityMatrix {
        id_column: "sample".to_string(),
        row_ids,
        features: features.to_vec(),
        values,
    }
}

/// Deterministic demo output: `n_samples` (at least 3) training rows and
/// `n_validation` validation rows over 100 features in 1000..10000 m/z, plus
/// an averaged spectrum with five injected peaks.
pub fn generate(n_samples: usize, n_validation: usize) -> DemoData {
    const N_FEATURES: usize = 100;
    let mut rng = SimpleRng::new(42);

    let mut mz: Vec<u64> = (0..N_FEATURES).map(|_| rng.range_u64(1000, 10000)).collect();
    mz.sort_unstable();
    let features: Vec<String> = mz.iter().map(|m| format!("mz_{m}")).collect();

    let train = random_matrix(&mut rng, &features, "Group", n_samples.max(3));
    let validation =
        (n_validation > 0).then(|| random_matrix(&mut rng, &features, "Valid", n_validation));

    let peaks = [2000.0, 3500.0, 5000.0, 7200.0, 8500.0];
    let axis: Vec<f64> = (0..1000).map(|i| 1000.0 + i as f64 * 9000.0 / 999.0).collect();
    let intensity = axis
        .iter()
        .map(|&x| {
            let signal: f64 = peaks.iter().map(|&mu| gaussian(x, mu, 20.0, 200.0)).sum();
            (rng.gauss(50.0, 10.0) + signal).abs()
        })
        .collect();

    DemoData {
        train,
        validation,
        spectrum: Spectrum {
            mz: axis,
            intensity,
        },
        params: ProcessingParameters::default(),
    }
}
