mod apply;
mod create;
mod delete;
mod run;
mod update;

pub use apply::cmd_apply;
pub use create::cmd_create;
pub use delete::cmd_delete;
pub use update::cmd_update;
