use clap::Parser;

/// Interactive chat client for OpenAI-compatible completion services.
///
/// Reads a prompt per line, streams the reply, and runs any tools the model
/// asks for until it produces an answer.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Interactive chat client for OpenAI-compatible services")]
pub struct CliArgs {
    /// Model name override (uses PARLEY_MODEL or the built-in default if not set)
    #[arg(long)]
    pub model: Option<String>,

    /// System prompt placed at the start of the conversation
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Request whole replies instead of streaming them
    #[arg(long)]
    pub no_stream: bool,

    /// Maximum tool rounds per turn (unbounded if not set)
    #[arg(long)]
    pub max_rounds: Option<usize>,

    /// Config profile; keys resolve as <PROFILE>_<KEY> before <KEY>
    #[arg(long, env = "PARLEY_PROFILE")]
    pub profile: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["parley"]).unwrap();
        assert!(args.model.is_none());
        assert!(!args.no_stream);
        assert!(args.max_rounds.is_none());
    }

    #[test]
    fn test_all_flags() {
        let args = CliArgs::try_parse_from([
            "parley",
            "--model",
            "gpt-4o",
            "--system-prompt",
            "Be brief.",
            "--no-stream",
            "--max-rounds",
            "3",
            "--profile",
            "PROD",
        ])
        .unwrap();
        assert_eq!(args.model.as_deref(), Some("gpt-4o"));
        assert_eq!(args.system_prompt.as_deref(), Some("Be brief."));
        assert!(args.no_stream);
        assert_eq!(args.max_rounds, Some(3));
        assert_eq!(args.profile.as_deref(), Some("PROD"));
    }

    #[test]
    fn test_max_rounds_must_be_a_number() {
        assert!(CliArgs::try_parse_from(["parley", "--max-rounds", "many"]).is_err());
    }
}
