/// Integer HSV triple: hue in `[0, 360)`, saturation and value in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HsvColor {
    pub hue: u16,
    pub saturation: u8,
    pub value: u8,
}

impl HsvColor {
    pub fn new(hue: u16, saturation: u8, value: u8) -> Self {
        Self {
            hue: hue % 360,
            saturation: saturation.min(100),
            value: value.min(100),
        }
    }

    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        rgb_to_hsv(r, g, b)
    }
}

/// Hexagonal max/min/delta conversion with the hue rounded to whole degrees
/// and saturation/value rounded to whole percent.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> HsvColor {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;

    let max = r.max(g.max(b));
    let min = r.min(g.min(b));
    let delta = max - min;

    let sector = if delta == 0.0 {
        0.0
    } else if max == r {
        // `%` keeps the sign of the dividend, so magenta-ish reds come out negative
        ((g - b) / delta) % 6.0
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };

    let mut hue = round_half_up(sector * 60.0);
    if hue < 0.0 {
        hue += 360.0;
    }
    let hue = hue as u16;

    let saturation = if max == 0.0 {
        0.0
    } else {
        round_half_up(delta / max * 100.0).clamp(0.0, 100.0)
    };
    let value = round_half_up(max * 100.0);

    HsvColor {
        hue,
        saturation: saturation as u8,
        value: value as u8,
    }
}

// Ties round towards +infinity so -0.5 becomes 0, not -1.
fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}
