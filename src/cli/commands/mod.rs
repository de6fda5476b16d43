//! CLI command implementations

pub mod config;
pub mod drift;
pub mod evidence;
pub mod init;
pub mod list;
pub mod migrate;
pub mod qa;
pub mod quarantine;
pub mod show;
pub mod status;

pub use config::execute as config;
pub use drift::execute as drift;
pub use evidence::execute as evidence;
pub use init::execute as init;
pub use list::execute as list;
pub use migrate::execute as migrate;
pub use qa::execute as qa;
pub use quarantine::execute as quarantine;
pub use show::execute as show;
pub use status::execute as status;

use crate::config::Config;
use crate::error::{TalosError, TalosResult};
use crate::facade::CacheFacade;

/// Open the engine facade from the current directory
pub(crate) async fn open_facade(config: &Config) -> TalosResult<CacheFacade> {
    let cwd =
        std::env::current_dir().map_err(|e| TalosError::io("getting current directory", e))?;
    CacheFacade::open(config.clone(), &cwd).await
}
