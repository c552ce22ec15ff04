//! Geometry-relevant configuration.
//!
//! Values arrive either as a flat list of named string options (the form an
//! outer settings layer hands over) or as JSON. Only what the layout needs
//! is kept here, and it round-trips through JSON unchanged.

use serde::{Deserialize, Serialize};

use crate::error::{EngraveError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngraveConfig {
    pub page_width: f64,
    pub page_height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    /// Stroke width of stafflines and ledger lines
    pub staffline_width: f64,
    pub stem_width: f64,
    /// Distance between two adjacent stafflines; the unit for all padding
    pub gap_size: f64,
    /// Minimum distance between the bottom line of one staff and the top
    /// line of the next within a system
    pub min_staff_gap: f64,
    /// Minimum distance between systems
    pub min_system_gap: f64,
    /// Quarter notes per minute until a tempo direction says otherwise
    pub tempo_bpm: f64,
    /// 1-based measure numbers that start a new system
    pub system_starts: Vec<u32>,
}

impl Default for EngraveConfig {
    fn default() -> Self {
        Self {
            page_width: 820.0,
            page_height: 1160.0,
            margin_top: 30.0,
            margin_bottom: 30.0,
            margin_left: 50.0,
            margin_right: 30.0,
            staffline_width: 0.8,
            stem_width: 1.2,
            gap_size: 10.0,
            min_staff_gap: 60.0,
            min_system_gap: 90.0,
            tempo_bpm: 120.0,
            system_starts: Vec::new(),
        }
    }
}

impl EngraveConfig {
    /// Build a configuration from named options, starting from the defaults.
    pub fn from_options<'a, I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = EngraveConfig::default();
        for (name, value) in options {
            config.set_option(name, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Set one named option. Names use the kebab-case field names.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        let slot = match name {
            "page-width" => &mut self.page_width,
            "page-height" => &mut self.page_height,
            "margin-top" => &mut self.margin_top,
            "margin-bottom" => &mut self.margin_bottom,
            "margin-left" => &mut self.margin_left,
            "margin-right" => &mut self.margin_right,
            "staffline-width" => &mut self.staffline_width,
            "stem-width" => &mut self.stem_width,
            "gap-size" => &mut self.gap_size,
            "min-staff-gap" => &mut self.min_staff_gap,
            "min-system-gap" => &mut self.min_system_gap,
            "tempo-bpm" => &mut self.tempo_bpm,
            "system-starts" => {
                self.system_starts = parse_measure_list(value)?;
                return Ok(());
            }
            _ => return Err(EngraveError::Config(format!("unknown option '{name}'"))),
        };
        *slot = value
            .trim()
            .parse::<f64>()
            .map_err(|_| EngraveError::Config(format!("option '{name}' is not a number: '{value}'")))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let numeric = [
            ("page-width", self.page_width),
            ("page-height", self.page_height),
            ("margin-top", self.margin_top),
            ("margin-bottom", self.margin_bottom),
            ("margin-left", self.margin_left),
            ("margin-right", self.margin_right),
            ("staffline-width", self.staffline_width),
            ("stem-width", self.stem_width),
            ("gap-size", self.gap_size),
            ("min-staff-gap", self.min_staff_gap),
            ("min-system-gap", self.min_system_gap),
            ("tempo-bpm", self.tempo_bpm),
        ];
        for (name, value) in numeric {
            if !value.is_finite() || value < 0.0 {
                return Err(EngraveError::Config(format!("'{name}' must be a non-negative number, got {value}")));
            }
        }
        if self.gap_size == 0.0 {
            return Err(EngraveError::Config("'gap-size' must be positive".into()));
        }
        if self.tempo_bpm == 0.0 {
            return Err(EngraveError::Config("'tempo-bpm' must be positive".into()));
        }
        if self.content_width() <= 0.0 {
            return Err(EngraveError::Config("margins leave no room for content".into()));
        }
        Ok(())
    }

    pub fn content_width(&self) -> f64 {
        self.page_width - self.margin_left - self.margin_right
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngraveConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Parse a measure-location list such as `"1, 5, 9"`.
pub fn parse_measure_list(text: &str) -> Result<Vec<u32>> {
    let mut out = Vec::new();
    for token in text.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        out.push(parse_measure_number(token)?);
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Parse a single 1-based measure number.
pub fn parse_measure_number(token: &str) -> Result<u32> {
    match token.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(EngraveError::syntax(format!("invalid measure location '{token}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn options_override_defaults() {
        let config = EngraveConfig::from_options([
            ("page-width", "600"),
            ("gap-size", "8.5"),
            ("system-starts", "5, 1,9"),
        ])
        .unwrap();
        assert_eq!(config.page_width, 600.0);
        assert_eq!(config.gap_size, 8.5);
        assert_eq!(config.system_starts, vec![1, 5, 9]);
        assert_eq!(config.margin_left, EngraveConfig::default().margin_left);
    }

    #[test]
    fn json_round_trip() {
        let mut config = EngraveConfig::default();
        config.page_height = 900.0;
        config.system_starts = vec![1, 4];
        let json = config.to_json().unwrap();
        assert!(json.contains("\"page-height\": 900.0"));
        assert_eq!(EngraveConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = EngraveConfig::from_json(r#"{"gap-size": 12}"#).unwrap();
        assert_eq!(config.gap_size, 12.0);
        assert_eq!(config.page_width, 820.0);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngraveConfig::from_options([("gap-size", "-1")]),
            Err(EngraveError::Config(_))
        ));
        assert!(matches!(
            EngraveConfig::from_options([("gap-size", "0")]),
            Err(EngraveError::Config(_))
        ));
        assert!(matches!(
            EngraveConfig::from_options([("page-width", "wide")]),
            Err(EngraveError::Config(_))
        ));
        assert!(matches!(
            EngraveConfig::from_options([("colour", "red")]),
            Err(EngraveError::Config(_))
        ));
        assert!(matches!(
            EngraveConfig::from_options([("system-starts", "1,x")]),
            Err(EngraveError::Syntax { .. })
        ));
    }
}
