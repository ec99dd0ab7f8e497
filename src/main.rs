use anyhow::Result;
use std::path::PathBuf;

use chainpulse::config::Config;
use chainpulse::error::IssueLog;
use chainpulse::logging::{log, obj, v_num, v_str, Domain, Level};
use chainpulse::pipeline::{export_report, run_all};
use chainpulse::source::PublicApis;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    log(
        Level::Info,
        Domain::System,
        "start",
        obj(&[
            ("reference", v_str(&cfg.reference_coin)),
            ("compare_chain", v_str(&cfg.compare_chain)),
            ("top_n", v_num(cfg.top_n as f64)),
            ("history_days", v_num(cfg.history_days as f64)),
            ("out_dir", v_str(&cfg.out_dir)),
        ]),
    );

    let source = PublicApis::from_config(&cfg)?;
    let mut issues = IssueLog::new();

    let Some(report) = run_all(&source, &cfg, &mut issues).await else {
        log(Level::Error, Domain::System, "nothing_to_export", obj(&[]));
        std::process::exit(2);
    };

    let written = export_report(&report, &PathBuf::from(&cfg.out_dir))?;

    for (coin, min_corr) in &report.correlation.lowest {
        println!("{:<24} min corr vs {}: {:.4}", coin, cfg.reference_coin, min_corr);
    }

    log(
        Level::Info,
        Domain::System,
        "done",
        obj(&[
            ("tables", v_num(written.len() as f64)),
            ("issues", v_num(issues.issues().len() as f64)),
            ("regimes", v_num(report.correlation.regimes.len() as f64)),
        ]),
    );
    Ok(())
}
