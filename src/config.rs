use argh::FromArgs;
use log::LevelFilter;

/// Resource caps applied while planning a line. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of `|`-separated stages in one line.
    pub max_stages: Option<usize>,
    /// Maximum length of a single token, in bytes.
    pub max_token_len: Option<usize>,
}

#[derive(FromArgs, Debug)]
/// A small interactive shell with pipelines and file redirection.
pub struct Options {
    #[argh(option, default = "String::from(\"$ \")")]
    /// text printed before each input line
    pub prompt: String,

    #[argh(option)]
    /// reject pipelines with more than this many stages
    pub max_stages: Option<usize>,

    #[argh(option)]
    /// reject tokens longer than this many bytes
    pub max_token_len: Option<usize>,

    #[argh(option, default = "LevelFilter::Warn")]
    /// log verbosity on stderr: off, error, warn, info, debug or trace
    pub log_level: LevelFilter,

    #[argh(option, short = 'c')]
    /// execute a single command line and exit with its status
    pub command: Option<String>,
}

impl Options {
    pub fn limits(&self) -> Limits {
        Limits {
            max_stages: self.max_stages,
            max_token_len: self.max_token_len,
        }
    }
}
