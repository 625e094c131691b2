use std::env;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::optimizer::{Algorithm, GaConfig, GreedyConfig, HybridConfig, PackingConfig, Strategy};

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub optimizer: OptimizerConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            optimizer: OptimizerConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value = env_string("CONTAINER_LOADER_API_HOST")
            .unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                eprintln!(
                    "⚠️ Could not parse CONTAINER_LOADER_API_HOST ('{}'): {}. Using {}.",
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = parse_or_default(
            "CONTAINER_LOADER_API_PORT",
            env_string("CONTAINER_LOADER_API_PORT"),
            Self::DEFAULT_PORT,
            |value: u16| value != 0,
            "must not be 0",
        );

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// Configuration of the placement strategies.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerConfig {
    packing: PackingConfig,
    greedy: GreedyConfig,
    genetic: GaConfig,
    hybrid: HybridConfig,
    default_algorithm: Algorithm,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            packing: PackingConfig::default(),
            greedy: GreedyConfig::default(),
            genetic: GaConfig::default(),
            hybrid: HybridConfig::default(),
            default_algorithm: Algorithm::Blf,
        }
    }
}

impl OptimizerConfig {
    const SUPPORT_RATIO_VAR: &'static str = "CONTAINER_LOADER_SUPPORT_RATIO";
    const HEIGHT_EPSILON_VAR: &'static str = "CONTAINER_LOADER_HEIGHT_EPSILON";
    const GENERAL_EPSILON_VAR: &'static str = "CONTAINER_LOADER_GENERAL_EPSILON";
    const GREEDY_RESTARTS_VAR: &'static str = "CONTAINER_LOADER_GREEDY_RESTARTS";
    const GREEDY_PASSES_VAR: &'static str = "CONTAINER_LOADER_GREEDY_PASSES";
    const GREEDY_GRID_SAMPLES_VAR: &'static str = "CONTAINER_LOADER_GREEDY_GRID_SAMPLES";
    const GREEDY_COMPACTION_VAR: &'static str = "CONTAINER_LOADER_GREEDY_COMPACTION";
    const GA_POPULATION_VAR: &'static str = "CONTAINER_LOADER_GA_POPULATION";
    const GA_GENERATIONS_VAR: &'static str = "CONTAINER_LOADER_GA_GENERATIONS";
    const GA_ELITISM_VAR: &'static str = "CONTAINER_LOADER_GA_ELITISM";
    const GA_CROSSOVER_RATE_VAR: &'static str = "CONTAINER_LOADER_GA_CROSSOVER_RATE";
    const GA_MUTATION_RATE_VAR: &'static str = "CONTAINER_LOADER_GA_MUTATION_RATE";
    const GA_TOURNAMENT_SIZE_VAR: &'static str = "CONTAINER_LOADER_GA_TOURNAMENT_SIZE";
    const HYBRID_THRESHOLD_VAR: &'static str = "CONTAINER_LOADER_HYBRID_THRESHOLD";
    const HYBRID_BUDGET_VAR: &'static str = "CONTAINER_LOADER_HYBRID_BUDGET_SECS";
    const SEED_VAR: &'static str = "CONTAINER_LOADER_SEED";
    const ALGORITHM_VAR: &'static str = "CONTAINER_LOADER_DEFAULT_ALGORITHM";

    fn from_env() -> Self {
        let support_ratio = load_with_warning(
            Self::SUPPORT_RATIO_VAR,
            PackingConfig::DEFAULT_SUPPORT_RATIO,
            |value: f64| (0.0..=1.0).contains(&value),
            "must be between 0 and 1",
            "Warning: Adjusted minimum support may lead to unstable stacks",
        );

        let height_epsilon = load_with_warning(
            Self::HEIGHT_EPSILON_VAR,
            PackingConfig::DEFAULT_HEIGHT_EPSILON,
            |value: f64| value > 0.0,
            "must be greater than 0",
            "Warning: Adjusted height tolerance changes which faces count as touching",
        );

        let general_epsilon = load_with_warning(
            Self::GENERAL_EPSILON_VAR,
            PackingConfig::DEFAULT_GENERAL_EPSILON,
            |value: f64| value > 0.0,
            "must be greater than 0",
            "Warning: Adjusted tolerances may cause numerical instabilities",
        );

        let packing = PackingConfig::builder()
            .support_ratio(support_ratio)
            .height_epsilon(height_epsilon)
            .general_epsilon(general_epsilon)
            .build();

        let seed = env_string(Self::SEED_VAR).and_then(|raw| match raw.parse::<u64>() {
            Ok(value) => {
                println!("🎲 Using fixed random seed {} ({}).", value, Self::SEED_VAR);
                Some(value)
            }
            Err(err) => {
                eprintln!(
                    "⚠️ Could not parse {} ('{}') as number: {}. Using random seeds.",
                    Self::SEED_VAR,
                    raw,
                    err
                );
                None
            }
        });

        let greedy = GreedyConfig {
            restarts: load_count(Self::GREEDY_RESTARTS_VAR, GreedyConfig::DEFAULT_RESTARTS),
            passes: load_count(Self::GREEDY_PASSES_VAR, GreedyConfig::DEFAULT_PASSES),
            grid_samples: load_count(Self::GREEDY_GRID_SAMPLES_VAR, GreedyConfig::DEFAULT_GRID_SAMPLES),
            compaction: env_string(Self::GREEDY_COMPACTION_VAR)
                .and_then(|raw| parse_bool(&raw, Self::GREEDY_COMPACTION_VAR))
                .unwrap_or(true),
            seed,
        };

        let population_size = load_count(Self::GA_POPULATION_VAR, GaConfig::DEFAULT_POPULATION_SIZE);
        let genetic = GaConfig {
            population_size,
            generations: load_count(Self::GA_GENERATIONS_VAR, GaConfig::DEFAULT_GENERATIONS),
            elitism: load_with_warning(
                Self::GA_ELITISM_VAR,
                GaConfig::DEFAULT_ELITISM,
                |value: usize| value <= population_size,
                "must not exceed the population size",
                "Warning: Adjusted elitism changes selection pressure",
            ),
            crossover_rate: load_rate(Self::GA_CROSSOVER_RATE_VAR, GaConfig::DEFAULT_CROSSOVER_RATE),
            mutation_rate: load_rate(Self::GA_MUTATION_RATE_VAR, GaConfig::DEFAULT_MUTATION_RATE),
            tournament_size: load_count(Self::GA_TOURNAMENT_SIZE_VAR, GaConfig::DEFAULT_TOURNAMENT_SIZE),
            seed,
        };

        let hybrid = HybridConfig {
            threshold: load_with_warning(
                Self::HYBRID_THRESHOLD_VAR,
                HybridConfig::DEFAULT_THRESHOLD,
                |_: usize| true,
                "",
                "Warning: Adjusted threshold changes which instances reach the exact solver",
            ),
            budget: Duration::from_secs(load_count(
                Self::HYBRID_BUDGET_VAR,
                HybridConfig::DEFAULT_BUDGET.as_secs() as usize,
            ) as u64),
            greedy: greedy.clone(),
        };

        let default_algorithm = match env_string(Self::ALGORITHM_VAR) {
            Some(raw) => raw.parse::<Algorithm>().unwrap_or_else(|err| {
                eprintln!("⚠️ {} ({}). Using BLF.", err, Self::ALGORITHM_VAR);
                Algorithm::Blf
            }),
            None => Algorithm::Blf,
        };

        Self {
            packing,
            greedy,
            genetic,
            hybrid,
            default_algorithm,
        }
    }

    /// Returns the configured PackingConfig.
    pub fn packing_config(&self) -> PackingConfig {
        self.packing
    }

    /// Algorithm used when a request does not name one.
    pub fn default_algorithm(&self) -> Algorithm {
        self.default_algorithm
    }

    /// Strategy for `algorithm` with the configured parameters.
    pub fn strategy(&self, algorithm: Algorithm) -> Strategy {
        match algorithm {
            Algorithm::Blf => Strategy::Blf,
            Algorithm::Greedy => Strategy::Greedy(self.greedy.clone()),
            Algorithm::Genetic => Strategy::Genetic(self.genetic.clone()),
            Algorithm::Hybrid => Strategy::Hybrid(self.hybrid.clone()),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            eprintln!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            eprintln!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

/// Parses `raw`, falling back to `default` with a warning on invalid input.
fn parse_or_default<T>(
    var_name: &str,
    raw: Option<String>,
    default: T,
    validator: impl Fn(T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + Copy + Display,
    T::Err: Display,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if validator(value) => value,
        Ok(_) => {
            eprintln!(
                "⚠️ {} contains invalid value '{}': {}. Using {}.",
                var_name, raw, invalid_hint, default
            );
            default
        }
        Err(err) => {
            eprintln!(
                "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                var_name, raw, err, default
            );
            default
        }
    }
}

fn load_with_warning<T>(
    var_name: &str,
    default: T,
    validator: impl Fn(T) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> T
where
    T: FromStr + Copy + Display + PartialEq,
    T::Err: Display,
{
    let value = parse_or_default(var_name, env_string(var_name), default, validator, invalid_hint);
    if value != default {
        println!("⚠️ {} ({} = {}).", warning, var_name, value);
    }
    value
}

fn load_count(var_name: &str, default: usize) -> usize {
    parse_or_default(
        var_name,
        env_string(var_name),
        default,
        |value: usize| value > 0,
        "must be greater than 0",
    )
}

fn load_rate(var_name: &str, default: f64) -> f64 {
    parse_or_default(
        var_name,
        env_string(var_name),
        default,
        |value: f64| (0.0..=1.0).contains(&value),
        "must be between 0 and 1",
    )
}
