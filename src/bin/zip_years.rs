use ecobici::{archive::zip_by_year, config::Config, logging};
use tracing::{error, info};

fn main() {
    logging::init("info");

    let result = Config::from_env()
        .and_then(|cfg| zip_by_year(&cfg.root_folder, &cfg.zip_dir));
    match result {
        Ok(written) => info!("wrote {} archives", written.len()),
        Err(e) => {
            error!("fatal error: {:?}", e);
            std::process::exit(1);
        }
    }
}
