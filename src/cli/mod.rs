mod annotate;
mod ask;
mod dispatch;
mod render;
mod request;
mod retrieve;
mod scene;
mod single;
mod submit;

pub use annotate::*;
pub use ask::*;
pub use dispatch::*;
pub use render::RenderCommand;
pub use request::*;
pub use retrieve::*;
pub use scene::*;
pub use single::*;
pub use submit::*;

use crate::config::{Opts, SubCommand};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

impl SubCommandExtend for SubCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        match self {
            SubCommand::Render(cmd) => cmd.run(opts).await,
            SubCommand::Scene(cmd) => cmd.run(opts).await,
            SubCommand::Single(cmd) => cmd.run(opts).await,
            SubCommand::Request(cmd) => cmd.run(opts).await,
            SubCommand::Submit(cmd) => cmd.run(opts).await,
            SubCommand::Retrieve(cmd) => cmd.run(opts).await,
            SubCommand::Annotate(cmd) => cmd.run(opts).await,
            SubCommand::Ask(cmd) => cmd.run(opts).await,
            SubCommand::Dispatch(cmd) => cmd.run(opts).await,
        }
    }
}
