#![warn(missing_docs)]
//! Wallet configuration: which chain, where the data lives, how logs are written and the policy knobs the ledger
//! reads.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::{
            policy::compound::{
                roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
            },
            RollingFileAppender,
        },
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};

/// Blocks a coinbase output waits before it can be spent
pub const DEFAULT_COINBASE_MATURITY: u32 = 100;
/// Attempts the approximate subset-sum solver makes per selection pass
pub const DEFAULT_COIN_SELECTION_ITERATIONS: usize = 1000;
/// Minimum seconds between two rebroadcasts of the wallet's unconfirmed records
pub const DEFAULT_MIN_RELAY_RESEND_INTERVAL_SECS: u64 = 5 * 60;
/// Confirmation target handed to fee estimation
pub const DEFAULT_TX_CONFIRM_TARGET: u32 = 2;
/// Log file name inside the data directory
pub const DEFAULT_LOGFILE_NAME: &str = "zen-wallet.debug.log";

const LOG_PATTERN: &str = "{d} {l}::{m}{n}";
const LOG_ROLL_SIZE: u64 = 5 * 1024 * 1024;
const LOG_ROLL_WINDOW: u32 = 3;

/// Errors from building or reading a configuration
#[allow(missing_docs)] // error types document themselves
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown chain \"{0}\", expected main, test or regtest")]
    UnknownChain(String),
    #[error("could not locate a home directory for the wallet data")]
    NoDataDir,
    #[error("log setup failed: {0}")]
    Log(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The chain a wallet follows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChainType {
    /// Production chain
    #[default]
    Mainnet,
    /// Public test chain
    Testnet,
    /// Local chain for tests
    Regtest,
}

impl ChainType {
    /// Subdirectory of the data directory holding this chain's files
    pub fn data_subdir(&self) -> Option<&'static str> {
        match self {
            ChainType::Mainnet => None,
            ChainType::Testnet => Some("testnet3"),
            ChainType::Regtest => Some("regtest"),
        }
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainType::Mainnet => "main",
            ChainType::Testnet => "test",
            ChainType::Regtest => "regtest",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ChainType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(ChainType::Mainnet),
            "test" => Ok(ChainType::Testnet),
            "regtest" => Ok(ChainType::Regtest),
            other => Err(ConfigError::UnknownChain(other.to_string())),
        }
    }
}

/// Builder for [`WalletConfig`]. Unset fields take the documented defaults.
#[derive(Clone, Debug)]
pub struct WalletConfigBuilder {
    /// Chain followed
    pub chain: ChainType,
    /// Root of the wallet data, the platform default when `None`
    pub data_dir: Option<PathBuf>,
    /// Log threshold
    pub log_level: LevelFilter,
    /// Also write logs to stdout
    pub log_to_console: bool,
    /// Allow spending our own unconfirmed change
    pub spend_zero_conf_change: bool,
    /// Blocks a coinbase output waits before it can be spent
    pub coinbase_maturity: u32,
    /// Coinbase outputs may only be spent into the shielded pool
    pub coinbase_must_be_protected: bool,
    /// Attempts of the subset-sum solver
    pub coin_selection_iterations: usize,
    /// Confirmation target for fee estimation
    pub tx_confirm_target: u32,
    /// Minimum seconds between rebroadcasts
    pub min_relay_resend_interval_secs: u64,
}

impl Default for WalletConfigBuilder {
    fn default() -> Self {
        WalletConfigBuilder {
            chain: ChainType::default(),
            data_dir: None,
            log_level: LevelFilter::Debug,
            log_to_console: false,
            spend_zero_conf_change: true,
            coinbase_maturity: DEFAULT_COINBASE_MATURITY,
            coinbase_must_be_protected: true,
            coin_selection_iterations: DEFAULT_COIN_SELECTION_ITERATIONS,
            tx_confirm_target: DEFAULT_TX_CONFIRM_TARGET,
            min_relay_resend_interval_secs: DEFAULT_MIN_RELAY_RESEND_INTERVAL_SECS,
        }
    }
}

impl WalletConfigBuilder {
    /// Sets the chain
    pub fn set_chain(&mut self, chain: ChainType) -> &mut Self {
        self.chain = chain;
        self
    }

    /// Sets the data directory
    pub fn set_data_dir(&mut self, dir: PathBuf) -> &mut Self {
        self.data_dir = Some(dir);
        self
    }

    /// Sets the log threshold
    pub fn set_log_level(&mut self, level: LevelFilter) -> &mut Self {
        self.log_level = level;
        self
    }

    /// Sets whether our own unconfirmed change can be spent
    pub fn set_spend_zero_conf_change(&mut self, spend: bool) -> &mut Self {
        self.spend_zero_conf_change = spend;
        self
    }

    /// Sets the coinbase maturity, which is also the witness cache depth
    pub fn set_coinbase_maturity(&mut self, blocks: u32) -> &mut Self {
        self.coinbase_maturity = blocks;
        self
    }

    /// Sets coinbase protection
    pub fn set_coinbase_must_be_protected(&mut self, protected: bool) -> &mut Self {
        self.coinbase_must_be_protected = protected;
        self
    }

    /// Sets the subset-sum attempt budget
    pub fn set_coin_selection_iterations(&mut self, iterations: usize) -> &mut Self {
        self.coin_selection_iterations = iterations;
        self
    }

    /// Builds the configuration.
    pub fn create(&self) -> WalletConfig {
        WalletConfig {
            chain: self.chain,
            data_dir: self.data_dir.clone(),
            log_level: self.log_level,
            log_to_console: self.log_to_console,
            spend_zero_conf_change: self.spend_zero_conf_change,
            coinbase_maturity: self.coinbase_maturity,
            coinbase_must_be_protected: self.coinbase_must_be_protected,
            coin_selection_iterations: self.coin_selection_iterations,
            tx_confirm_target: self.tx_confirm_target,
            min_relay_resend_interval_secs: self.min_relay_resend_interval_secs,
        }
    }
}

/// Wallet configuration
#[derive(Clone, Debug)]
pub struct WalletConfig {
    /// Chain followed
    pub chain: ChainType,
    /// Root of the wallet data, the platform default when `None`
    pub data_dir: Option<PathBuf>,
    /// Log threshold
    pub log_level: LevelFilter,
    /// Also write logs to stdout
    pub log_to_console: bool,
    /// Allow spending our own unconfirmed change
    pub spend_zero_conf_change: bool,
    /// Blocks a coinbase output waits before it can be spent
    pub coinbase_maturity: u32,
    /// Coinbase outputs may only be spent into the shielded pool
    pub coinbase_must_be_protected: bool,
    /// Attempts of the subset-sum solver
    pub coin_selection_iterations: usize,
    /// Confirmation target for fee estimation
    pub tx_confirm_target: u32,
    /// Minimum seconds between rebroadcasts
    pub min_relay_resend_interval_secs: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        WalletConfigBuilder::default().create()
    }
}

impl WalletConfig {
    /// Witnesses kept per note. Equal to the coinbase maturity so a note can be rolled back as far as a coinbase,
    /// and never less than one: the newest witness is always kept.
    pub fn witness_cache_size(&self) -> usize {
        (self.coinbase_maturity as usize).max(1)
    }

    /// Directory holding this chain's wallet files.
    pub fn wallet_dir(&self) -> Result<PathBuf, ConfigError> {
        let mut dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir().ok_or(ConfigError::NoDataDir)?,
        };
        if let Some(subdir) = self.chain.data_subdir() {
            dir.push(subdir);
        }
        Ok(dir)
    }

    /// Full path of the log file
    pub fn log_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.wallet_dir()?.join(DEFAULT_LOGFILE_NAME))
    }

    /// log4rs configuration writing to a size-rolled file in the wallet directory, and to stdout when
    /// `log_to_console` is set.
    pub fn get_log_config(&self) -> Result<Config, ConfigError> {
        let log_path = self.log_path()?;
        let roll_pattern = rolled_log_pattern(&log_path);
        let roller = FixedWindowRoller::builder()
            .build(&roll_pattern, LOG_ROLL_WINDOW)
            .map_err(|e| ConfigError::Log(e.to_string()))?;
        let policy = CompoundPolicy::new(
            Box::new(SizeTrigger::new(LOG_ROLL_SIZE)),
            Box::new(roller),
        );
        let logfile = RollingFileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build(&log_path, Box::new(policy))?;

        let mut builder = Config::builder().appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(self.log_level)))
                .build("logfile", Box::new(logfile)),
        );
        let mut root = Root::builder().appender("logfile");
        if self.log_to_console {
            let console = ConsoleAppender::builder()
                .target(Target::Stdout)
                .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
                .build();
            builder = builder.appender(
                Appender::builder()
                    .filter(Box::new(ThresholdFilter::new(self.log_level)))
                    .build("console", Box::new(console)),
            );
            root = root.appender("console");
        }
        builder
            .build(root.build(LevelFilter::Debug))
            .map_err(|e| ConfigError::Log(e.to_string()))
    }
}

/// Platform data directory: `~/Library/Application Support/Zen` on macOS, `~/.zen` elsewhere.
pub fn default_data_dir() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        dirs::data_dir().map(|dir| dir.join("Zen"))
    } else {
        dirs::home_dir().map(|dir| dir.join(".zen"))
    }
}

fn rolled_log_pattern(log_path: &Path) -> String {
    format!("{}.{{}}", log_path.to_string_lossy())
}
