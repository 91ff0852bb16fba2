use crate::api;
use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port } => api::new(port, globals).await?,
    }

    Ok(())
}
