/// The easing every client animates a spin with
pub const SPIN_EASING: CubicBezier = CubicBezier::new(0.33, 1., 0.68, 1.);

const NEWTON_ITERATIONS: usize = 8;
const BISECTION_ITERATIONS: usize = 32;
const EPSILON: f64 = 1e-7;

/// A cubic bezier timing function through (0, 0) and (1, 1), as used by CSS transitions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl CubicBezier {
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Maps linear progress in `[0, 1]` to eased progress
    pub fn ease(&self, progress: f64) -> f64 {
        if progress <= 0. {
            return 0.;
        }

        if progress >= 1. {
            return 1.;
        }

        let t = self.solve_x(progress);
        sample(self.y1, self.y2, t)
    }

    /// Finds the curve parameter whose x is `x`
    fn solve_x(&self, x: f64) -> f64 {
        let mut t = x;

        for _ in 0..NEWTON_ITERATIONS {
            let error = sample(self.x1, self.x2, t) - x;

            if error.abs() < EPSILON {
                return t;
            }

            let slope = sample_derivative(self.x1, self.x2, t);

            if slope.abs() < EPSILON {
                break;
            }

            t -= error / slope;
        }

        let (mut low, mut high) = (0., 1.);
        t = x;

        for _ in 0..BISECTION_ITERATIONS {
            let value = sample(self.x1, self.x2, t);

            if (value - x).abs() < EPSILON {
                break;
            }

            if value < x {
                low = t;
            } else {
                high = t;
            }

            t = (low + high) / 2.;
        }

        t
    }
}

/// One coordinate of the curve at `t`, given that coordinate of both control points
fn sample(p1: f64, p2: f64, t: f64) -> f64 {
    let c = 3. * p1;
    let b = 3. * (p2 - p1) - c;
    let a = 1. - c - b;

    ((a * t + b) * t + c) * t
}

fn sample_derivative(p1: f64, p2: f64, t: f64) -> f64 {
    let c = 3. * p1;
    let b = 3. * (p2 - p1) - c;
    let a = 1. - c - b;

    (3. * a * t + 2. * b) * t + c
}
