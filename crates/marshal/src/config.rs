//! Marshalling configuration.
//!
//! Supports both programmatic configuration and environment variable overrides.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `XML_INDENT_WIDTH` | 4 | Spaces per indentation level (0 disables indentation) |
//! | `XML_DECLARATION` | true | Write the `<?xml ...?>` declaration |
//! | `XML_DOCTYPE_SYSTEM_ID` | - | System identifier for a `<!DOCTYPE>` declaration |
//! | `XML_DEFAULT_NAMESPACE` | - | Default namespace declared on the root element |
//! | `XML_SKIP_EXTERNAL_ENTITIES` | false | Drop DOCTYPEs and unknown entity references on input |
//! | `XML_ASYNC_PIPE_CAPACITY` | 8192 | Buffer size (bytes) of the async marshalling pipe |
//! | `XML_ASYNC_WRITE_TIMEOUT` | 60 | Seconds a background marshaller waits for a stalled reader (0 waits forever) |
//!
//! [`Marshaller::try_new`](crate::Marshaller::try_new) refuses a configuration
//! that fails [`MarshalConfig::validate`]; the other constructors log each
//! problem at `warn` and keep going.
//!
//! # Example
//!
//! ```rust
//! use helios_marshal::MarshalConfig;
//!
//! let config = MarshalConfig {
//!     indent_width: 2,
//!     xml_declaration: false,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use clap::Parser;

/// Largest indentation accepted by [`MarshalConfig::validate`].
const MAX_INDENT_WIDTH: usize = 16;

/// Configuration shared by every operation of a [`Marshaller`](crate::Marshaller).
#[derive(Debug, Clone, Parser)]
#[command(name = "helios-marshal")]
#[command(about = "XML marshalling settings")]
pub struct MarshalConfig {
    /// Spaces per indentation level of marshalled output.
    #[arg(long, env = "XML_INDENT_WIDTH", default_value = "4")]
    pub indent_width: usize,

    /// Write an XML declaration before the root element.
    #[arg(long, env = "XML_DECLARATION", default_value = "true", action = clap::ArgAction::Set)]
    pub xml_declaration: bool,

    /// System identifier written as `<!DOCTYPE root SYSTEM "...">`.
    #[arg(long, env = "XML_DOCTYPE_SYSTEM_ID")]
    pub doctype_system_id: Option<String>,

    /// Default namespace declared on the root element.
    #[arg(long, env = "XML_DEFAULT_NAMESPACE")]
    pub default_namespace: Option<String>,

    /// Discard DOCTYPE declarations and references to external entities on input.
    #[arg(long, env = "XML_SKIP_EXTERNAL_ENTITIES", default_value = "false", action = clap::ArgAction::Set)]
    pub skip_external_entities: bool,

    /// Capacity in bytes of the pipe used by asynchronous marshalling.
    #[arg(long, env = "XML_ASYNC_PIPE_CAPACITY", default_value = "8192")]
    pub async_pipe_capacity: usize,

    /// Seconds a background marshaller waits on a full pipe before giving up.
    #[arg(long, env = "XML_ASYNC_WRITE_TIMEOUT", default_value = "60")]
    pub async_write_timeout_secs: u64,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            indent_width: 4,
            xml_declaration: true,
            doctype_system_id: None,
            default_namespace: None,
            skip_external_entities: false,
            async_pipe_capacity: 8192,
            async_write_timeout_secs: 60,
        }
    }
}

impl MarshalConfig {
    /// Creates a configuration from environment variables.
    ///
    /// Command line arguments of the host process are never consulted.
    pub fn from_env() -> Self {
        Self::try_parse_from(["helios-marshal"]).unwrap_or_default()
    }

    /// The write timeout of the async pipe, `None` meaning wait forever.
    pub fn async_write_timeout(&self) -> Option<Duration> {
        match self.async_write_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.indent_width > MAX_INDENT_WIDTH {
            errors.push(format!(
                "Indent width cannot exceed {}",
                MAX_INDENT_WIDTH
            ));
        }

        if self.async_pipe_capacity == 0 {
            errors.push("Async pipe capacity cannot be 0".to_string());
        }

        if let Some(id) = &self.doctype_system_id {
            if id.contains('"') {
                errors.push("DOCTYPE system identifier cannot contain '\"'".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing: compact output without a
    /// declaration and a short async timeout.
    pub fn for_testing() -> Self {
        Self {
            indent_width: 2,
            xml_declaration: false,
            doctype_system_id: None,
            default_namespace: None,
            skip_external_entities: false,
            async_pipe_capacity: 64,
            async_write_timeout_secs: 5,
        }
    }
}
