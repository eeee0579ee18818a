use confique::Config as DeriveConfig;

#[derive(Debug, DeriveConfig)]
pub struct Config {
    /// How many rounds of `_include` resolution to run before giving up.
    /// Chained includes need one round per link; the cap keeps include
    /// cycles from looping forever.
    #[config(default = 32, env = "BAKETPL_MAX_INCLUDE_DEPTH")]
    pub max_include_depth: usize,
}
