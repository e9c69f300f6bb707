/// Easing curves
///
/// Robert Penner's easing equations. Every curve maps
/// `(t, b, c, d)` = (elapsed iteration, base value, change in value, total
/// iterations) to the interpolated value at `t / d`.
use std::f64::consts::{PI, TAU};
use std::fmt;
use std::str::FromStr;

use crate::error::NameError;

const BACK_OVERSHOOT: f64 = 1.70158;

/// Named easing curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ease {
    Linear,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseInSine,
    EaseOutSine,
    EaseInOutSine,
    EaseInExpo,
    EaseOutExpo,
    EaseInOutExpo,
    EaseInCirc,
    EaseOutCirc,
    EaseInOutCirc,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    EaseInQuart,
    EaseOutQuart,
    EaseInOutQuart,
    EaseInQuint,
    EaseOutQuint,
    EaseInOutQuint,
    EaseInElastic,
    EaseOutElastic,
    EaseInOutElastic,
    EaseInBack,
    EaseOutBack,
    EaseInOutBack,
    EaseInBounce,
    EaseOutBounce,
    EaseInOutBounce,
}

impl Ease {
    /// Every curve, in declaration order
    pub const ALL: [Ease; 31] = [
        Ease::Linear,
        Ease::EaseInQuad,
        Ease::EaseOutQuad,
        Ease::EaseInOutQuad,
        Ease::EaseInSine,
        Ease::EaseOutSine,
        Ease::EaseInOutSine,
        Ease::EaseInExpo,
        Ease::EaseOutExpo,
        Ease::EaseInOutExpo,
        Ease::EaseInCirc,
        Ease::EaseOutCirc,
        Ease::EaseInOutCirc,
        Ease::EaseInCubic,
        Ease::EaseOutCubic,
        Ease::EaseInOutCubic,
        Ease::EaseInQuart,
        Ease::EaseOutQuart,
        Ease::EaseInOutQuart,
        Ease::EaseInQuint,
        Ease::EaseOutQuint,
        Ease::EaseInOutQuint,
        Ease::EaseInElastic,
        Ease::EaseOutElastic,
        Ease::EaseInOutElastic,
        Ease::EaseInBack,
        Ease::EaseOutBack,
        Ease::EaseInOutBack,
        Ease::EaseInBounce,
        Ease::EaseOutBounce,
        Ease::EaseInOutBounce,
    ];

    /// Curve name as used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            Ease::Linear => "linear",
            Ease::EaseInQuad => "easeInQuad",
            Ease::EaseOutQuad => "easeOutQuad",
            Ease::EaseInOutQuad => "easeInOutQuad",
            Ease::EaseInSine => "easeInSine",
            Ease::EaseOutSine => "easeOutSine",
            Ease::EaseInOutSine => "easeInOutSine",
            Ease::EaseInExpo => "easeInExpo",
            Ease::EaseOutExpo => "easeOutExpo",
            Ease::EaseInOutExpo => "easeInOutExpo",
            Ease::EaseInCirc => "easeInCirc",
            Ease::EaseOutCirc => "easeOutCirc",
            Ease::EaseInOutCirc => "easeInOutCirc",
            Ease::EaseInCubic => "easeInCubic",
            Ease::EaseOutCubic => "easeOutCubic",
            Ease::EaseInOutCubic => "easeInOutCubic",
            Ease::EaseInQuart => "easeInQuart",
            Ease::EaseOutQuart => "easeOutQuart",
            Ease::EaseInOutQuart => "easeInOutQuart",
            Ease::EaseInQuint => "easeInQuint",
            Ease::EaseOutQuint => "easeOutQuint",
            Ease::EaseInOutQuint => "easeInOutQuint",
            Ease::EaseInElastic => "easeInElastic",
            Ease::EaseOutElastic => "easeOutElastic",
            Ease::EaseInOutElastic => "easeInOutElastic",
            Ease::EaseInBack => "easeInBack",
            Ease::EaseOutBack => "easeOutBack",
            Ease::EaseInOutBack => "easeInOutBack",
            Ease::EaseInBounce => "easeInBounce",
            Ease::EaseOutBounce => "easeOutBounce",
            Ease::EaseInOutBounce => "easeInOutBounce",
        }
    }

    /// Look up a curve by name, falling back to the default curve with a
    /// warning when the name is unknown.
    pub fn resolve(name: &str) -> Ease {
        name.parse().unwrap_or_else(|err: NameError| {
            tracing::warn!("{}. Reverted to default ({})", err, Ease::default());
            Ease::default()
        })
    }

    /// Interpolated value at iteration `t` of `d`, from `b` by `c`.
    pub fn apply(&self, t: f64, b: f64, c: f64, d: f64) -> f64 {
        if d <= 0.0 {
            return b + c;
        }

        match self {
            Ease::Linear => c * t / d + b,
            Ease::EaseInQuad => {
                let t = t / d;
                c * t * t + b
            }
            Ease::EaseOutQuad => {
                let t = t / d;
                -c * t * (t - 2.0) + b
            }
            Ease::EaseInOutQuad => {
                let t = t / (d / 2.0);
                if t < 1.0 {
                    return c / 2.0 * t * t + b;
                }
                let t = t - 1.0;
                -c / 2.0 * (t * (t - 2.0) - 1.0) + b
            }
            Ease::EaseInSine => -c * (t / d * (PI / 2.0)).cos() + c + b,
            Ease::EaseOutSine => c * (t / d * (PI / 2.0)).sin() + b,
            Ease::EaseInOutSine => -c / 2.0 * ((PI * t / d).cos() - 1.0) + b,
            Ease::EaseInExpo => {
                if t == 0.0 {
                    b
                } else if t == d {
                    b + c
                } else {
                    c * 2f64.powf(10.0 * (t / d - 1.0)) + b
                }
            }
            Ease::EaseOutExpo => {
                if t == d {
                    b + c
                } else if t == 0.0 {
                    b
                } else {
                    c * (-(2f64.powf(-10.0 * t / d)) + 1.0) + b
                }
            }
            Ease::EaseInOutExpo => {
                if t == 0.0 {
                    return b;
                }
                if t == d {
                    return b + c;
                }
                let t = t / (d / 2.0);
                if t < 1.0 {
                    return c / 2.0 * 2f64.powf(10.0 * (t - 1.0)) + b;
                }
                c / 2.0 * (-(2f64.powf(-10.0 * (t - 1.0))) + 2.0) + b
            }
            Ease::EaseInCirc => {
                let t = t / d;
                -c * ((1.0 - t * t).sqrt() - 1.0) + b
            }
            Ease::EaseOutCirc => {
                let t = t / d - 1.0;
                c * (1.0 - t * t).sqrt() + b
            }
            Ease::EaseInOutCirc => {
                let t = t / (d / 2.0);
                if t < 1.0 {
                    return -c / 2.0 * ((1.0 - t * t).sqrt() - 1.0) + b;
                }
                let t = t - 2.0;
                c / 2.0 * ((1.0 - t * t).sqrt() + 1.0) + b
            }
            Ease::EaseInCubic => {
                let t = t / d;
                c * t * t * t + b
            }
            Ease::EaseOutCubic => {
                let t = t / d - 1.0;
                c * (t * t * t + 1.0) + b
            }
            Ease::EaseInOutCubic => {
                let t = t / (d / 2.0);
                if t < 1.0 {
                    return c / 2.0 * t * t * t + b;
                }
                let t = t - 2.0;
                c / 2.0 * (t * t * t + 2.0) + b
            }
            Ease::EaseInQuart => {
                let t = t / d;
                c * t * t * t * t + b
            }
            Ease::EaseOutQuart => {
                let t = t / d - 1.0;
                -c * (t * t * t * t - 1.0) + b
            }
            Ease::EaseInOutQuart => {
                let t = t / (d / 2.0);
                if t < 1.0 {
                    return c / 2.0 * t * t * t * t + b;
                }
                let t = t - 2.0;
                -c / 2.0 * (t * t * t * t - 2.0) + b
            }
            Ease::EaseInQuint => {
                let t = t / d;
                c * t * t * t * t * t + b
            }
            Ease::EaseOutQuint => {
                let t = t / d - 1.0;
                c * (t * t * t * t * t + 1.0) + b
            }
            Ease::EaseInOutQuint => {
                let t = t / (d / 2.0);
                if t < 1.0 {
                    return c / 2.0 * t * t * t * t * t + b;
                }
                let t = t - 2.0;
                c / 2.0 * (t * t * t * t * t + 2.0) + b
            }
            Ease::EaseInElastic => {
                if t == 0.0 {
                    return b;
                }
                let t = t / d;
                if t == 1.0 {
                    return b + c;
                }
                let p = d * 0.3;
                let (a, s) = elastic_amplitude(c, p);
                let t = t - 1.0;
                -(a * 2f64.powf(10.0 * t) * ((t * d - s) * TAU / p).sin()) + b
            }
            Ease::EaseOutElastic => {
                if t == 0.0 {
                    return b;
                }
                let t = t / d;
                if t == 1.0 {
                    return b + c;
                }
                let p = d * 0.3;
                let (a, s) = elastic_amplitude(c, p);
                a * 2f64.powf(-10.0 * t) * ((t * d - s) * TAU / p).sin() + c + b
            }
            Ease::EaseInOutElastic => {
                if t == 0.0 {
                    return b;
                }
                let t = t / (d / 2.0);
                if t == 2.0 {
                    return b + c;
                }
                let p = d * (0.3 * 1.5);
                let (a, s) = elastic_amplitude(c, p);
                let t = t - 1.0;
                if t < 0.0 {
                    return -0.5 * (a * 2f64.powf(10.0 * t) * ((t * d - s) * TAU / p).sin()) + b;
                }
                a * 2f64.powf(-10.0 * t) * ((t * d - s) * TAU / p).sin() * 0.5 + c + b
            }
            Ease::EaseInBack => {
                let s = BACK_OVERSHOOT;
                let t = t / d;
                c * t * t * ((s + 1.0) * t - s) + b
            }
            Ease::EaseOutBack => {
                let s = BACK_OVERSHOOT;
                let t = t / d - 1.0;
                c * (t * t * ((s + 1.0) * t + s) + 1.0) + b
            }
            Ease::EaseInOutBack => {
                let s = BACK_OVERSHOOT * 1.525;
                let t = t / (d / 2.0);
                if t < 1.0 {
                    return c / 2.0 * (t * t * ((s + 1.0) * t - s)) + b;
                }
                let t = t - 2.0;
                c / 2.0 * (t * t * ((s + 1.0) * t + s) + 2.0) + b
            }
            Ease::EaseInBounce => c - bounce_out(d - t, 0.0, c, d) + b,
            Ease::EaseOutBounce => bounce_out(t, b, c, d),
            Ease::EaseInOutBounce => {
                if t < d * 0.5 {
                    return Ease::EaseInBounce.apply(t * 2.0, 0.0, c, d) * 0.5 + b;
                }
                bounce_out(t * 2.0 - d, 0.0, c, d) * 0.5 + c * 0.5 + b
            }
        }
    }
}

/// Amplitude and phase shift for the elastic curves.
///
/// When both the amplitude and the change are zero, `asin(c / a)` would be
/// `asin(NaN)`; the maximum of the domain is used instead.
fn elastic_amplitude(c: f64, p: f64) -> (f64, f64) {
    let a = c;
    if a < c.abs() {
        return (c, p / 4.0);
    }
    let ratio = if a == 0.0 && c == 0.0 { 1.0 } else { c / a };
    (a, p / TAU * ratio.asin())
}

fn bounce_out(t: f64, b: f64, c: f64, d: f64) -> f64 {
    let t = t / d;
    if t < 1.0 / 2.75 {
        c * 7.5625 * t * t + b
    } else if t < 2.0 / 2.75 {
        let t = t - 1.5 / 2.75;
        c * (7.5625 * t * t + 0.75) + b
    } else if t < 2.5 / 2.75 {
        let t = t - 2.25 / 2.75;
        c * (7.5625 * t * t + 0.9375) + b
    } else {
        let t = t - 2.625 / 2.75;
        c * (7.5625 * t * t + 0.984375) + b
    }
}

impl Default for Ease {
    fn default() -> Self {
        Ease::EaseOutCubic
    }
}

impl fmt::Display for Ease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Ease {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ease::ALL
            .iter()
            .copied()
            .find(|ease| ease.name() == s)
            .ok_or_else(|| NameError::UnknownEase(s.to_string()))
    }
}
