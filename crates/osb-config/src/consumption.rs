/// Which process is reading the layered config. The CLI only ever reads a
/// thin slice of it (it doesn't run cycles or serve HTTP); the daemon reads
/// the whole thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    Daemon,
    Cli,
}

pub fn consumed_pointers(mode: ConfigMode) -> &'static [&'static str] {
    match mode {
        ConfigMode::Daemon => DAEMON,
        ConfigMode::Cli => CLI,
    }
}

static CLI: &[&str] = &["/service/name", "/log/level"];

static DAEMON: &[&str] = &[
    "/service/name",
    "/service/bind_addr",
    "/log/level",
    "/retry/default_max_attempts",
    "/retry/backoff_base_secs",
    "/retry/backoff_cap_secs",
    "/ledger/limit",
    "/scheduler/supervisor_backoff_base_secs",
    "/scheduler/supervisor_backoff_cap_secs",
    "/webhook/default_timeout_secs",
    "/upstream/default_timeout_secs",
];
