use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;
use std::sync::OnceLock;

static INIT: Once = Once::new();

static HOST: OnceLock<u32> = OnceLock::new();

pub fn init(host: u32) {
    INIT.call_once(|| {
        HOST.set(host).expect("logger host id set once");

        Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format(|buf, record| {
                let host = HOST.get().expect("logger.rs: HOST not initialized");
                writeln!(
                    buf,
                    "[HOST {}] {} - {}: {}",
                    host,
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .init();
    });
}

pub fn set_log_level(level: LevelFilter) {
    log::set_max_level(level);
}
