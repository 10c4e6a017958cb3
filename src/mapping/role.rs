//! Conversion roles and the slice of the source namespace each one sees.

use serde::{Deserialize, Serialize};

/// Marker prepended to every target name of the wrapped (disc/gen) models.
pub const BACKBONE_PREFIX: &str = "backbone_model.";

/// Which target model variant is being populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionRole {
    /// Shared trunk, written without any prefix
    Backbone,
    /// Backbone plus the replaced-token-detection head
    #[serde(rename = "disc")]
    Discriminator,
    /// Smaller backbone plus the masked-LM head
    #[serde(rename = "gen")]
    Generator,
}

impl ConversionRole {
    /// All roles in conversion order.
    pub const ALL: [ConversionRole; 3] = [
        ConversionRole::Backbone,
        ConversionRole::Discriminator,
        ConversionRole::Generator,
    ];

    /// Whether a source name is visible to this role.
    #[must_use]
    pub fn accepts(self, source_name: &str) -> bool {
        match self {
            Self::Backbone => source_name.contains("electra"),
            Self::Discriminator => !source_name.contains("generator"),
            Self::Generator => source_name.contains("generator"),
        }
    }

    /// Prefix applied to target names before rewriting.
    #[must_use]
    pub fn target_prefix(self) -> &'static str {
        match self {
            Self::Backbone => "",
            Self::Discriminator | Self::Generator => BACKBONE_PREFIX,
        }
    }

    /// Variable scope holding this role's encoder in the source checkpoint.
    #[must_use]
    pub fn source_scope(self) -> &'static str {
        match self {
            Self::Backbone | Self::Discriminator => "electra",
            Self::Generator => "generator",
        }
    }

    /// File stem of this role's parameter output.
    #[must_use]
    pub fn params_stem(self) -> &'static str {
        match self {
            Self::Backbone => "model",
            Self::Discriminator => "disc_model",
            Self::Generator => "gen_model",
        }
    }
}

impl std::fmt::Display for ConversionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionRole::Backbone => write!(f, "backbone"),
            ConversionRole::Discriminator => write!(f, "disc"),
            ConversionRole::Generator => write!(f, "gen"),
        }
    }
}

impl std::str::FromStr for ConversionRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "backbone" => Ok(ConversionRole::Backbone),
            "disc" | "discriminator" => Ok(ConversionRole::Discriminator),
            "gen" | "generator" => Ok(ConversionRole::Generator),
            _ => Err(format!(
                "Unknown conversion role: {s}. Valid roles: backbone, disc, gen"
            )),
        }
    }
}
