//! Rule compilation: selection model in, filter-tool script out.

pub mod compiler;
pub mod model;
pub mod profile;
pub mod script;
pub mod toolchain;

pub use compiler::RuleCompiler;
pub use model::{BringUpAccounts, ClassSelection, FilterMode, OwnerId, RuleSet, TrafficClass};
pub use profile::{InterfaceProfile, LogFormat};
pub use script::{Directive, Guard, Script};
pub use toolchain::{CpuInfoProbe, CpuVariant, FixedVariant, Toolchain, VariantProbe};
