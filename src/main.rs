use std::process::ExitCode;

use clap::{error::ErrorKind, Parser};
use openvpn_probe::{
    check::{run_check, CheckResult},
    configuration::Configuration,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();

    let conf = match Configuration::try_parse() {
        Ok(conf) => conf,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => return report(CheckResult::from_parse_error(&e)),
    };

    log::info!(
        "Checking {}:{} over {}",
        conf.host,
        conf.port,
        conf.transport()
    );

    report(run_check(&conf).await)
}

fn report(result: CheckResult) -> ExitCode {
    println!("{}", result);
    ExitCode::from(result.exit_code())
}
