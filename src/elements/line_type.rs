//! Line types - physical constants of a line product

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::DEFAULT_LINE_CW;
use crate::error::{LineSetError, LineSetResult};

/// RGB colour of a line variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Parse a hex colour such as `"ff6600"` or `"#FF6600"`
    pub fn parse_hex(hex: &str) -> LineSetResult<Self> {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(LineSetError::InvalidInput(format!("invalid colour '{}'", hex)));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| LineSetError::InvalidInput(format!("invalid colour '{}'", hex)))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    pub fn hex(&self) -> String {
        format!("{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Physical constants of a line product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineType {
    /// Registry key, `manufacturer.product[.size]`
    pub name: String,
    /// Diameter in mm
    pub thickness: f64,
    /// Samples of (load [N], stretch [%]), sorted by load
    pub stretch_curve: Vec<(f64, f64)>,
    /// Nominal breaking strength in N
    pub min_break_load: Option<f64>,
    /// Weight in g/m
    pub weight: f64,
    /// Sheathed (mantled) line
    pub sheated: bool,
    /// Drag coefficient in cross flow
    pub cw: f64,
    /// Extra length consumed by sewn end loops (m)
    pub seam_correction: f64,
    /// Available colour variants
    pub colors: BTreeMap<String, Color>,
}

impl LineType {
    /// Create a new line type
    pub fn new(
        name: &str,
        thickness: f64,
        stretch_curve: Vec<(f64, f64)>,
        min_break_load: f64,
        weight: f64,
        sheated: bool,
    ) -> Self {
        let mut stretch_curve = stretch_curve;
        stretch_curve.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            name: name.to_string(),
            thickness,
            stretch_curve,
            min_break_load: Some(min_break_load),
            weight,
            sheated,
            cw: DEFAULT_LINE_CW,
            seam_correction: 0.0,
            colors: BTreeMap::new(),
        }
    }

    pub fn with_seam_correction(mut self, seam_correction: f64) -> Self {
        self.seam_correction = seam_correction;
        self
    }

    pub fn with_cw(mut self, cw: f64) -> Self {
        self.cw = cw;
        self
    }

    pub fn with_color(mut self, name: &str, color: Color) -> Self {
        self.colors.insert(name.to_string(), color);
        self
    }

    /// Diameter in metres
    pub fn diameter(&self) -> f64 {
        self.thickness / 1000.0
    }

    /// Relative elongation (fraction, not percent) under `force`.
    ///
    /// The curve is interpolated linearly through the origin and continued
    /// with its last segment; negative loads do not shorten the line.
    pub fn stretch_fraction(&self, force: f64) -> f64 {
        let force = force.max(0.0);
        let mut prev = (0.0, 0.0);
        for &(load, stretch) in &self.stretch_curve {
            if force <= load {
                return interpolate(prev, (load, stretch), force) / 100.0;
            }
            prev = (load, stretch);
        }
        // extrapolate with the last segment
        let n = self.stretch_curve.len();
        let before_last = if n >= 2 { self.stretch_curve[n - 2] } else { (0.0, 0.0) };
        interpolate(before_last, prev, force) / 100.0
    }

    /// Length factor `1 + stretch` under `force`
    pub fn stretch_factor(&self, force: f64) -> f64 {
        1.0 + self.stretch_fraction(force)
    }
}

fn interpolate(a: (f64, f64), b: (f64, f64), x: f64) -> f64 {
    let dx = b.0 - a.0;
    if dx.abs() < 1e-12 {
        return b.1;
    }
    a.1 + (b.1 - a.1) * (x - a.0) / dx
}

/// Named lookup of line types.
///
/// Owned by the application and handed to whatever builds line sets.
#[derive(Debug, Clone, Default)]
pub struct LineTypeRegistry {
    types: BTreeMap<String, Arc<LineType>>,
}

impl LineTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with the built-in catalogue
    pub fn with_catalog() -> Self {
        let mut registry = Self::new();
        super::catalog::register_all(&mut registry);
        registry
    }

    /// Register a line type; names must be unique and dotted
    pub fn register(&mut self, line_type: LineType) -> LineSetResult<Arc<LineType>> {
        let name = line_type.name.clone();
        if !name.contains('.') || name.starts_with('.') || name.ends_with('.') {
            return Err(LineSetError::InvalidLineTypeName(name));
        }
        if self.types.contains_key(&name) {
            return Err(LineSetError::DuplicateLineType(name));
        }
        let line_type = Arc::new(line_type);
        self.types.insert(name, Arc::clone(&line_type));
        Ok(line_type)
    }

    /// Look up a line type by name
    pub fn get(&self, name: &str) -> LineSetResult<Arc<LineType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| LineSetError::LineTypeNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_sample_is_linear() {
        let lt = LineType::new("liros.ltc25", 0.39, vec![(250.0, 4.8)], 250.0, 0.13, false);
        assert_relative_eq!(lt.stretch_fraction(125.0), 0.024, epsilon = 1e-12);
        assert_relative_eq!(lt.stretch_fraction(500.0), 0.096, epsilon = 1e-12);
        assert_eq!(lt.stretch_fraction(-10.0), 0.0);
    }

    #[test]
    fn test_piecewise_curve() {
        let lt = LineType::new("liros.ltc80", 0.7, vec![(100.0, 0.65), (300.0, 1.65)], 800.0, 0.57, false);
        assert_relative_eq!(lt.stretch_fraction(100.0), 0.0065, epsilon = 1e-12);
        assert_relative_eq!(lt.stretch_fraction(200.0), 0.0115, epsilon = 1e-12);
        // continued with the last segment
        assert_relative_eq!(lt.stretch_fraction(500.0), 0.0265, epsilon = 1e-12);
        assert_relative_eq!(lt.stretch_factor(50.0), 1.00325, epsilon = 1e-12);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = LineTypeRegistry::new();
        let lt = LineType::new("test.line", 1.0, vec![(100.0, 1.0)], 1000.0, 1.0, true);
        registry.register(lt.clone()).unwrap();
        assert!(matches!(
            registry.register(lt),
            Err(LineSetError::DuplicateLineType(_))
        ));
        assert!(matches!(
            registry.register(LineType::new("nodot", 1.0, vec![], 1.0, 1.0, true)),
            Err(LineSetError::InvalidLineTypeName(_))
        ));
        assert!(registry.get("test.line").is_ok());
        assert!(matches!(
            registry.get("test.other"),
            Err(LineSetError::LineTypeNotFound(_))
        ));
    }

    #[test]
    fn test_color_parse() {
        let c = Color::parse_hex("#FF6600").unwrap();
        assert_eq!((c.r, c.g, c.b), (255, 102, 0));
        assert_eq!(c.hex(), "ff6600");
        assert!(Color::parse_hex("xyz").is_err());
    }
}
