mod operator;
mod registry;
mod schema;

pub use operator::ToolOperator;
pub use registry::{RegisteredTool, ToolHandler, ToolRegistry};
pub use schema::{builtin_tool_schemas, BUILT_IN_TOOLS};
