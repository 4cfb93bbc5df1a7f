use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which footballer(s) appear next to the user in the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Persona {
    #[default]
    Ronaldo,
    Messi,
    Both,
}

impl Persona {
    /// Surface order, matching the selector the user picks from.
    pub const ALL: [Persona; 3] = [Persona::Ronaldo, Persona::Messi, Persona::Both];

    pub fn label(self) -> &'static str {
        match self {
            Persona::Ronaldo => "Ronaldo",
            Persona::Messi => "Messi",
            Persona::Both => "Both",
        }
    }

    /// Lower-cased label used in download file names.
    pub fn slug(self) -> String {
        self.label().to_ascii_lowercase()
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Persona {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim();
        Persona::ALL
            .into_iter()
            .find(|persona| persona.label().eq_ignore_ascii_case(needle))
            .ok_or_else(|| {
                format!(
                    "Unknown footballer '{needle}'. Choose one of: {}",
                    labels(&Persona::ALL.map(Persona::label))
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Style {
    #[default]
    Casual,
    Photorealistic,
    Cinematic,
    Professional,
}

impl Style {
    pub const ALL: [Style; 4] = [
        Style::Casual,
        Style::Photorealistic,
        Style::Cinematic,
        Style::Professional,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Style::Casual => "Casual",
            Style::Photorealistic => "Photorealistic",
            Style::Cinematic => "Cinematic",
            Style::Professional => "Professional",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim();
        Style::ALL
            .into_iter()
            .find(|style| style.label().eq_ignore_ascii_case(needle))
            .ok_or_else(|| {
                format!(
                    "Unknown style '{needle}'. Choose one of: {}",
                    labels(&Style::ALL.map(Style::label))
                )
            })
    }
}

fn labels(values: &[&str]) -> String {
    values.join(", ")
}
