use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use komoot_gpx::api::DEFAULT_API_BASE;
use komoot_gpx::TypeFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Download Komoot tours as GPX files")]
#[command(group(ArgGroup::new("selection").args(["make_gpx", "make_all"])))]
pub struct Cli {
    /// Login using this email address
    #[arg(short, long, env = "KOMOOT_MAIL")]
    pub mail: Option<String>,

    /// Password for the login
    #[arg(short, long = "pass", env = "KOMOOT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Skip the login exchange and use this token, with --mail holding the account id
    #[arg(long, env = "KOMOOT_TOKEN", hide_env_values = true, conflicts_with = "password")]
    pub token: Option<String>,

    /// Skip authentication, only valid with --make-gpx
    #[arg(short = 'n', long)]
    pub anonymous: bool,

    /// List all tours of the logged in user
    #[arg(short, long)]
    pub list_tours: bool,

    /// Download a tour as GPX
    #[arg(short = 'd', long, value_name = "TOUR_ID")]
    pub make_gpx: Option<String>,

    /// Download all tours
    #[arg(short = 'a', long)]
    pub make_all: bool,

    /// Do not download a tour if its file already exists
    #[arg(short, long)]
    pub skip_existing: bool,

    /// Use only the tour id as file name
    #[arg(short = 'I', long)]
    pub id_filename: bool,

    /// Prefix file names with the tour date
    #[arg(short = 'D', long)]
    pub add_date: bool,

    /// Crop the title used in file names, -1 for no limit
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub max_title_length: i64,

    /// Only consider tours of this type
    #[arg(short, long, value_enum, default_value_t = TypeFilter::All)]
    pub filter: TypeFilter,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Do not include highlights and POIs as waypoints
    #[arg(short = 'e', long)]
    pub no_poi: bool,

    /// Limit waypoint descriptions to this many characters, -1 for no limit
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub max_desc_length: i64,

    #[arg(long, env = "KOMOOT_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Write every API response to this directory
    #[arg(long)]
    pub debug_dir: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn max_title_length(&self) -> i64 {
        if self.id_filename {
            0
        } else {
            self.max_title_length
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download() {
        let cli = Cli::try_parse_from([
            "komoot-gpx", "-m", "me@example.com", "-p", "pw", "-d", "123", "-f", "recorded",
            "--max-desc-length", "40", "-I",
        ])
        .unwrap();
        assert_eq!(cli.make_gpx.as_deref(), Some("123"));
        assert_eq!(cli.filter, TypeFilter::Recorded);
        assert_eq!(cli.max_desc_length, 40);
        assert_eq!(cli.max_title_length(), 0);
        assert!(!cli.no_poi);
    }

    #[test]
    fn test_selection_is_exclusive() {
        let result = Cli::try_parse_from(["komoot-gpx", "-n", "-d", "1", "-a"]);
        assert!(result.is_err());
    }
}
