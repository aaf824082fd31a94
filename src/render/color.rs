//! Colour specifications and linear HSL gradients.
//!
//! A [`ColorSpec`] is a validated colour string: a web colour name
//! (case-insensitive) or `#rgb` / `#rrggbb` hex. Gradients interpolate hue,
//! saturation and lightness linearly between two colours, and channels are
//! converted to bytes by truncation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Differences below this are treated as achromatic
const FLOAT_ERROR: f64 = 5e-7;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid colour specification '{0}'")]
pub struct InvalidColorError(pub String);

/// CSS/X11 web colour names, sorted for binary search
const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("aliceblue", [240, 248, 255]),
    ("antiquewhite", [250, 235, 215]),
    ("aqua", [0, 255, 255]),
    ("aquamarine", [127, 255, 212]),
    ("azure", [240, 255, 255]),
    ("beige", [245, 245, 220]),
    ("bisque", [255, 228, 196]),
    ("black", [0, 0, 0]),
    ("blanchedalmond", [255, 235, 205]),
    ("blue", [0, 0, 255]),
    ("blueviolet", [138, 43, 226]),
    ("brown", [165, 42, 42]),
    ("burlywood", [222, 184, 135]),
    ("cadetblue", [95, 158, 160]),
    ("chartreuse", [127, 255, 0]),
    ("chocolate", [210, 105, 30]),
    ("coral", [255, 127, 80]),
    ("cornflowerblue", [100, 149, 237]),
    ("cornsilk", [255, 248, 220]),
    ("crimson", [220, 20, 60]),
    ("cyan", [0, 255, 255]),
    ("darkblue", [0, 0, 139]),
    ("darkcyan", [0, 139, 139]),
    ("darkgoldenrod", [184, 134, 11]),
    ("darkgray", [169, 169, 169]),
    ("darkgreen", [0, 100, 0]),
    ("darkgrey", [169, 169, 169]),
    ("darkkhaki", [189, 183, 107]),
    ("darkmagenta", [139, 0, 139]),
    ("darkolivegreen", [85, 107, 47]),
    ("darkorange", [255, 140, 0]),
    ("darkorchid", [153, 50, 204]),
    ("darkred", [139, 0, 0]),
    ("darksalmon", [233, 150, 122]),
    ("darkseagreen", [143, 188, 143]),
    ("darkslateblue", [72, 61, 139]),
    ("darkslategray", [47, 79, 79]),
    ("darkslategrey", [47, 79, 79]),
    ("darkturquoise", [0, 206, 209]),
    ("darkviolet", [148, 0, 211]),
    ("deeppink", [255, 20, 147]),
    ("deepskyblue", [0, 191, 255]),
    ("dimgray", [105, 105, 105]),
    ("dimgrey", [105, 105, 105]),
    ("dodgerblue", [30, 144, 255]),
    ("firebrick", [178, 34, 34]),
    ("floralwhite", [255, 250, 240]),
    ("forestgreen", [34, 139, 34]),
    ("fuchsia", [255, 0, 255]),
    ("gainsboro", [220, 220, 220]),
    ("ghostwhite", [248, 248, 255]),
    ("gold", [255, 215, 0]),
    ("goldenrod", [218, 165, 32]),
    ("gray", [128, 128, 128]),
    ("green", [0, 128, 0]),
    ("greenyellow", [173, 255, 47]),
    ("grey", [128, 128, 128]),
    ("honeydew", [240, 255, 240]),
    ("hotpink", [255, 105, 180]),
    ("indianred", [205, 92, 92]),
    ("indigo", [75, 0, 130]),
    ("ivory", [255, 255, 240]),
    ("khaki", [240, 230, 140]),
    ("lavender", [230, 230, 250]),
    ("lavenderblush", [255, 240, 245]),
    ("lawngreen", [124, 252, 0]),
    ("lemonchiffon", [255, 250, 205]),
    ("lightblue", [173, 216, 230]),
    ("lightcoral", [240, 128, 128]),
    ("lightcyan", [224, 255, 255]),
    ("lightgoldenrodyellow", [250, 250, 210]),
    ("lightgray", [211, 211, 211]),
    ("lightgreen", [144, 238, 144]),
    ("lightgrey", [211, 211, 211]),
    ("lightpink", [255, 182, 193]),
    ("lightsalmon", [255, 160, 122]),
    ("lightseagreen", [32, 178, 170]),
    ("lightskyblue", [135, 206, 250]),
    ("lightslategray", [119, 136, 153]),
    ("lightslategrey", [119, 136, 153]),
    ("lightsteelblue", [176, 196, 222]),
    ("lightyellow", [255, 255, 224]),
    ("lime", [0, 255, 0]),
    ("limegreen", [50, 205, 50]),
    ("linen", [250, 240, 230]),
    ("magenta", [255, 0, 255]),
    ("maroon", [128, 0, 0]),
    ("mediumaquamarine", [102, 205, 170]),
    ("mediumblue", [0, 0, 205]),
    ("mediumorchid", [186, 85, 211]),
    ("mediumpurple", [147, 112, 219]),
    ("mediumseagreen", [60, 179, 113]),
    ("mediumslateblue", [123, 104, 238]),
    ("mediumspringgreen", [0, 250, 154]),
    ("mediumturquoise", [72, 209, 204]),
    ("mediumvioletred", [199, 21, 133]),
    ("midnightblue", [25, 25, 112]),
    ("mintcream", [245, 255, 250]),
    ("mistyrose", [255, 228, 225]),
    ("moccasin", [255, 228, 181]),
    ("navajowhite", [255, 222, 173]),
    ("navy", [0, 0, 128]),
    ("oldlace", [253, 245, 230]),
    ("olive", [128, 128, 0]),
    ("olivedrab", [107, 142, 35]),
    ("orange", [255, 165, 0]),
    ("orangered", [255, 69, 0]),
    ("orchid", [218, 112, 214]),
    ("palegoldenrod", [238, 232, 170]),
    ("palegreen", [152, 251, 152]),
    ("paleturquoise", [175, 238, 238]),
    ("palevioletred", [219, 112, 147]),
    ("papayawhip", [255, 239, 213]),
    ("peachpuff", [255, 218, 185]),
    ("peru", [205, 133, 63]),
    ("pink", [255, 192, 203]),
    ("plum", [221, 160, 221]),
    ("powderblue", [176, 224, 230]),
    ("purple", [128, 0, 128]),
    ("rebeccapurple", [102, 51, 153]),
    ("red", [255, 0, 0]),
    ("rosybrown", [188, 143, 143]),
    ("royalblue", [65, 105, 225]),
    ("saddlebrown", [139, 69, 19]),
    ("salmon", [250, 128, 114]),
    ("sandybrown", [244, 164, 96]),
    ("seagreen", [46, 139, 87]),
    ("seashell", [255, 245, 238]),
    ("sienna", [160, 82, 45]),
    ("silver", [192, 192, 192]),
    ("skyblue", [135, 206, 235]),
    ("slateblue", [106, 90, 205]),
    ("slategray", [112, 128, 144]),
    ("slategrey", [112, 128, 144]),
    ("snow", [255, 250, 250]),
    ("springgreen", [0, 255, 127]),
    ("steelblue", [70, 130, 180]),
    ("tan", [210, 180, 140]),
    ("teal", [0, 128, 128]),
    ("thistle", [216, 191, 216]),
    ("tomato", [255, 99, 71]),
    ("turquoise", [64, 224, 208]),
    ("violet", [238, 130, 238]),
    ("wheat", [245, 222, 179]),
    ("white", [255, 255, 255]),
    ("whitesmoke", [245, 245, 245]),
    ("yellow", [255, 255, 0]),
    ("yellowgreen", [154, 205, 50]),
];

fn parse_hex(hex: &str) -> Option<[u8; 3]> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0; 3];
            for (i, c) in hex.chars().enumerate() {
                rgb[i] = channel(&format!("{c}{c}"))?;
            }
            Some(rgb)
        }
        6 => Some([channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?]),
        _ => None,
    }
}

/// A validated colour, kept together with the string it was parsed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColorSpec {
    spec: String,
    bytes: [u8; 3],
}

impl ColorSpec {
    pub fn parse(spec: &str) -> Result<Self, InvalidColorError> {
        let trimmed = spec.trim();
        let bytes = match trimmed.strip_prefix('#') {
            Some(hex) => parse_hex(hex),
            None => {
                let name = trimmed.to_ascii_lowercase().replace(' ', "");
                NAMED_COLORS
                    .binary_search_by(|(n, _)| (*n).cmp(name.as_str()))
                    .ok()
                    .map(|i| NAMED_COLORS[i].1)
            }
        };
        bytes
            .map(|bytes| Self {
                spec: trimmed.to_string(),
                bytes,
            })
            .ok_or_else(|| InvalidColorError(spec.to_string()))
    }

    /// Known-good colour without a table lookup
    pub(crate) fn named(name: &str, bytes: [u8; 3]) -> Self {
        Self {
            spec: name.to_string(),
            bytes,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.spec
    }

    /// Channels in `[0, 1]`
    pub fn rgb(&self) -> [f64; 3] {
        self.bytes.map(|c| c as f64 / 255.0)
    }

    pub fn hsl(&self) -> [f64; 3] {
        rgb_to_hsl(self.rgb())
    }

    pub fn to_rgb8(&self) -> [u8; 3] {
        self.bytes
    }

    /// `steps` colours from `self` to `end` inclusive, interpolated in HSL.
    ///
    /// One step yields just the start colour.
    pub fn range_to(&self, end: &ColorSpec, steps: usize) -> Vec<[f64; 3]> {
        hsl_gradient(self.hsl(), end.hsl(), steps)
            .into_iter()
            .map(hsl_to_rgb)
            .collect()
    }
}

impl FromStr for ColorSpec {
    type Err = InvalidColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ColorSpec {
    type Error = InvalidColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ColorSpec> for String {
    fn from(value: ColorSpec) -> Self {
        value.spec
    }
}

impl fmt::Display for ColorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

/// Truncating `[0, 1]` to `0..=255` conversion
pub fn rgb_to_bytes(rgb: [f64; 3]) -> [u8; 3] {
    rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0) as u8)
}

pub fn rgb_to_hsl([r, g, b]: [f64; 3]) -> [f64; 3] {
    let vmin = r.min(g).min(b);
    let vmax = r.max(g).max(b);
    let diff = vmax - vmin;
    let vsum = vmin + vmax;
    let l = vsum / 2.0;

    if diff < FLOAT_ERROR {
        return [0.0, 0.0, l];
    }

    let s = if l < 0.5 { diff / vsum } else { diff / (2.0 - vsum) };

    let dr = ((vmax - r) / 6.0 + diff / 2.0) / diff;
    let dg = ((vmax - g) / 6.0 + diff / 2.0) / diff;
    let db = ((vmax - b) / 6.0 + diff / 2.0) / diff;

    let mut h = if r == vmax {
        db - dg
    } else if g == vmax {
        1.0 / 3.0 + dr - db
    } else {
        2.0 / 3.0 + dg - dr
    };
    if h < 0.0 {
        h += 1.0;
    }
    if h > 1.0 {
        h -= 1.0;
    }
    [h, s, l]
}

fn hue_to_rgb(v1: f64, v2: f64, mut hue: f64) -> f64 {
    while hue < 0.0 {
        hue += 1.0;
    }
    while hue > 1.0 {
        hue -= 1.0;
    }
    if 6.0 * hue < 1.0 {
        v1 + (v2 - v1) * 6.0 * hue
    } else if 2.0 * hue < 1.0 {
        v2
    } else if 3.0 * hue < 2.0 {
        v1 + (v2 - v1) * (2.0 / 3.0 - hue) * 6.0
    } else {
        v1
    }
}

pub fn hsl_to_rgb([h, s, l]: [f64; 3]) -> [f64; 3] {
    if s == 0.0 {
        return [l, l, l];
    }
    let v2 = if l < 0.5 { l * (1.0 + s) } else { (l + s) - s * l };
    let v1 = 2.0 * l - v2;
    [
        hue_to_rgb(v1, v2, h + 1.0 / 3.0),
        hue_to_rgb(v1, v2, h),
        hue_to_rgb(v1, v2, h - 1.0 / 3.0),
    ]
}

/// `steps` evenly spaced HSL triples, both ends included
pub fn hsl_gradient(begin: [f64; 3], end: [f64; 3], steps: usize) -> Vec<[f64; 3]> {
    if steps == 0 {
        return Vec::new();
    }
    let intervals = steps - 1;
    let step: [f64; 3] = if intervals > 0 {
        [0, 1, 2].map(|i| (end[i] - begin[i]) / intervals as f64)
    } else {
        [0.0; 3]
    };
    (0..steps)
        .map(|r| [0, 1, 2].map(|i| begin[i] + step[i] * r as f64))
        .collect()
}
