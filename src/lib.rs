pub mod ast;
pub mod batch;
pub mod client;
pub mod command;
pub mod formatter;
pub mod literal;
pub mod metadata;
pub mod reader;
pub mod request;
pub mod value;
pub mod version;

pub use ast::{BinOp, Expr, UnaryOp, reference, value};
pub use batch::{Batch, BatchError};
pub use client::{Client, ClientError, HttpResponse, Settings, Transport, TransportFault};
pub use command::{Command, Key};
pub use formatter::{CommandFormatter, EscapeMode, FormatError, format_command, format_filter};
pub use metadata::{MetadataResolver, NameNotFound, Schema};
pub use reader::{ReadError, ResponseNode, parse_response};
pub use request::{HttpRequest, Method, Target};
pub use value::{Record, Value};
pub use version::ProtocolVersion;
