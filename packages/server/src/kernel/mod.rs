//! Kernel module - server infrastructure and dependencies.

pub mod archiver;
pub mod deps;
pub mod launcher;
pub mod notifier;
pub mod scheduled_tasks;
pub mod signer;
pub mod test_dependencies;
pub mod traits;

pub use archiver::TarGzArchiver;
pub use deps::ServerDeps;
pub use launcher::{CommandLauncher, PortainerLauncher};
pub use notifier::WebhookNotifier;
pub use signer::{FingerprintCache, GpgSigner, SignError};
pub use test_dependencies::TestDependencies;
pub use traits::*;
