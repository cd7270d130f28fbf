use clap::{Parser, Subcommand};

/// Terminal chat for OpenAI-compatible APIs
#[derive(Debug, Parser)]
#[command(name = "deepchat")]
#[command(version)]
#[command(about = "Chat with OpenAI-compatible models from the terminal", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new profile (prompts for name, model id, API key and endpoint)
    Add,

    /// Select the active profile
    Switch {
        /// Profile name (prompted when omitted)
        name: Option<String>,
    },

    /// Modify an existing profile
    Edit {
        /// Profile name (prompted when omitted)
        name: Option<String>,
    },

    /// Remove one profile
    Delete {
        /// Profile name (prompted when omitted)
        name: Option<String>,
    },

    /// Remove every profile and the active selection
    #[command(name = "delete-all", alias = "deleteAll")]
    DeleteAll,

    /// Print all profiles, marking the active one
    #[command(alias = "ls")]
    List,

    /// Print build information and file locations
    Info,

    /// Start an interactive chat session (default)
    Chat {
        /// Number of most recent messages kept as context
        #[arg(long = "max", value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
        max: Option<u32>,
    },
}
