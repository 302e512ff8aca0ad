//! Bootstrap Script Generator.
//!
//! Reads a module manifest, decides how each module is fetched and writes a
//! `bootstrap.sh` (plus an archive of local site code) into a directory every
//! node can see. [`deploy`] then runs that script on each enrolled node.

mod archive;
mod deploy;
mod manifest;
mod render;
mod statement;

pub use archive::{SiteArchive, build_archive};
pub use deploy::deploy;
pub use manifest::{BootstrapModule, ModuleSource, parse_manifest, parse_manifest_file};
pub use render::{
    ARCHIVE_NAME, GeneratedBundle, SCRIPT_NAME, ScriptGenerator, ScriptPlan, generate_bundle,
};
pub use statement::{
    InstallStatement, MissingCredentialPolicy, Planned, SkipDiagnostic, plan, public_repo,
};
