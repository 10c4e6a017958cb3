//! Configuration: source hyperparameters, the translated target config, the
//! YAML run configuration, and the CLI argument types.

mod cli;
mod run;
mod source;
mod target;
mod translate;

pub use cli::{Cli, Command, ConvertArgs, MapArgs, ValidateConfigArgs};
pub use run::{
    CheckSection, ConfigValidator, ConvertConfig, DeviceSection, OutputSection, SourceSection,
};
pub use source::{ModelSize, SourceConfig};
pub use target::{InitArg, InitializerConfig, ModelConfig, TargetConfig};
pub use translate::{translate, LAYER_NORM_EPS};
