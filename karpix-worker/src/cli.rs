/// Parsed command-line arguments.
pub struct CliArgs {
    /// Path to configuration file, if provided via `--config-path` or `-c`.
    pub config_path: Option<String>,
    /// Exit once the queue is empty.
    pub burst: bool,
    /// Whether help was requested.
    pub help_requested: bool,
}

impl CliArgs {
    /// Parse command-line arguments.
    ///
    /// Supported flags:
    /// - `--config-path <path>` or `--config-path=<path>` or `-c <path>`: Path to config file
    /// - `--burst` or `-b`: Drain the queue and exit
    /// - `--help` or `-h`: Print help and exit
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    fn from_args(args: &[String]) -> Self {
        let flag = |long: &str, short: &str| args.iter().skip(1).any(|a| a == long || a == short);
        Self {
            config_path: Self::extract_config_path(args),
            burst: flag("--burst", "-b"),
            help_requested: flag("--help", "-h"),
        }
    }

    /// Print usage information to stderr.
    pub fn print_help() {
        eprintln!(
            "Usage: karpix-worker [--config-path PATH] [--burst] [--help]\n\n\
             --config-path, -c    Path to configuration file (overrides KARPIX_CONFIG_PATH env var)\n\
             --burst, -b          Process queued jobs, then exit"
        );
    }

    fn extract_config_path(args: &[String]) -> Option<String> {
        let mut i = 1usize;
        while i < args.len() {
            let a = &args[i];
            if let Some(stripped) = a.strip_prefix("--config-path=") {
                return Some(stripped.to_string());
            } else if a == "--config-path" || a == "-c" {
                return args.get(i + 1).cloned();
            } else if let Some(stripped) = a.strip_prefix("-c=") {
                return Some(stripped.to_string());
            }
            i += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("karpix-worker")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_config_path_forms() {
        assert_eq!(CliArgs::from_args(&args(&["-c", "w.toml"])).config_path.as_deref(), Some("w.toml"));
        assert_eq!(
            CliArgs::from_args(&args(&["--config-path=w.yaml"])).config_path.as_deref(),
            Some("w.yaml")
        );
        assert_eq!(CliArgs::from_args(&args(&["--config-path"])).config_path, None);
    }

    #[test]
    fn parses_flags() {
        let parsed = CliArgs::from_args(&args(&["--burst"]));
        assert!(parsed.burst);
        assert!(!parsed.help_requested);
        assert!(CliArgs::from_args(&args(&["-h"])).help_requested);
    }
}
