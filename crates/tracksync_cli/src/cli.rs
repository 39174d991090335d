use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracksync_core::tools::Tool;

#[derive(Parser, Debug)]
#[command(name = "tracksync")]
#[command(author, version, about = "Estimate and apply the audio offset between two releases")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the tracks of a media file
    Tracks {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Estimate the offset of SOURCE relative to REFERENCE
    Offset {
        /// File whose timeline is authoritative
        reference: PathBuf,

        /// File whose audio is measured against the reference
        source: PathBuf,

        /// Audio track id in the reference (first audio track if omitted)
        #[arg(long)]
        reference_track: Option<usize>,

        /// Audio track id in the source (first audio track if omitted)
        #[arg(long)]
        source_track: Option<usize>,

        /// Seed for window placement
        #[arg(long)]
        seed: Option<u64>,

        /// Correlate windows in parallel
        #[arg(long)]
        parallel: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mux the source audio track into the reference with an offset
    Mux {
        reference: PathBuf,

        source: PathBuf,

        /// Audio track id in the reference used for estimation
        #[arg(long)]
        reference_track: Option<usize>,

        /// Audio track id in the source to mux
        #[arg(long)]
        source_track: Option<usize>,

        /// Measured offset in milliseconds (positive when the source is late);
        /// estimated when omitted. The track is muxed with the opposite delay.
        #[arg(long, allow_negative_numbers = true)]
        offset: Option<i64>,

        /// Seed for window placement when estimating
        #[arg(long)]
        seed: Option<u64>,

        /// Mux a warped estimate using its median
        #[arg(long)]
        force: bool,

        /// Output folder (defaults to the configured one)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Extract a full audio track from a Matroska file
    Extract {
        #[arg(required = true)]
        file: PathBuf,

        /// Audio track id (first audio track if omitted)
        #[arg(long)]
        track: Option<usize>,

        /// Output folder (defaults to the configured one)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Check that required external tools are available
    CheckTools {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Store a tool path in [tools] (empty PATH clears it)
        #[arg(long = "tool-path", value_name = "TOOL=PATH", value_parser = parse_tool_path)]
        tool_paths: Vec<(Tool, Option<String>)>,
    },
}

fn parse_tool_path(arg: &str) -> Result<(Tool, Option<String>), String> {
    let (name, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected TOOL=PATH, got '{}'", arg))?;
    let tool = Tool::from_binary_name(name.trim()).ok_or_else(|| {
        let known: Vec<_> = Tool::ALL.iter().map(|t| t.binary_name()).collect();
        format!("unknown tool '{}' (expected one of {})", name, known.join(", "))
    })?;
    let path = path.trim();
    Ok((tool, (!path.is_empty()).then(|| path.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_offset_with_track_selectors() {
        let cli = Cli::try_parse_from([
            "tracksync",
            "offset",
            "a.mkv",
            "b.mkv",
            "--source-track",
            "2",
            "--seed",
            "7",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Offset {
                reference,
                source,
                reference_track,
                source_track,
                seed,
                parallel,
                json,
            } => {
                assert_eq!(reference, PathBuf::from("a.mkv"));
                assert_eq!(source, PathBuf::from("b.mkv"));
                assert_eq!(reference_track, None);
                assert_eq!(source_track, Some(2));
                assert_eq!(seed, Some(7));
                assert!(!parallel);
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn mux_accepts_negative_offset() {
        let cli = Cli::try_parse_from(["tracksync", "mux", "a.mkv", "b.mkv", "--offset", "-120"])
            .unwrap();

        match cli.command {
            Commands::Mux { offset, force, .. } => {
                assert_eq!(offset, Some(-120));
                assert!(!force);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["tracksync", "check-tools", "--config", "alt.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(cli.command, Commands::CheckTools { json: false }));
    }

    #[test]
    fn check_tools_json() {
        let cli = Cli::try_parse_from(["tracksync", "check-tools", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckTools { json: true }));
    }

    #[test]
    fn config_tool_paths() {
        let cli = Cli::try_parse_from([
            "tracksync",
            "config",
            "--tool-path",
            "mkvmerge=/opt/mkvtoolnix/mkvmerge",
            "--tool-path",
            "ffmpeg=",
        ])
        .unwrap();

        match cli.command {
            Commands::Config { tool_paths } => assert_eq!(
                tool_paths,
                vec![
                    (Tool::Mkvmerge, Some("/opt/mkvtoolnix/mkvmerge".to_string())),
                    (Tool::Ffmpeg, None),
                ]
            ),
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["tracksync", "config", "--tool-path", "sox=/bin/sox"]).is_err());
        assert!(Cli::try_parse_from(["tracksync", "config", "--tool-path", "mkvmerge"]).is_err());
    }

    #[test]
    fn offset_requires_two_inputs() {
        assert!(Cli::try_parse_from(["tracksync", "offset", "a.mkv"]).is_err());
    }
}
