use clap::{CommandFactory, Parser};
use log::{error, info, warn};
use paramsift::aggregate::Aggregator;
use paramsift::cli::Cli;
use paramsift::fetch::{HttpFetcher, RequestTemplate};
use paramsift::output::{build_records, print_console, write_export};
use paramsift::pipeline::{run, Engine, Input};
use paramsift::scan::{read_raw_request, read_url_lines, read_url_list, walk_directory};
use paramsift::utils::set_color_enabled;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Instant;

/// Collects URL targets from flags, the list file, the raw request and
/// piped stdin, dropping repeats while keeping the first-seen order.
fn url_targets(
    cli: &Cli,
    stdin_piped: bool,
    request_url: Option<String>,
) -> Result<Vec<String>, paramsift::Error> {
    let mut urls: Vec<String> = cli.url.iter().map(|u| u.trim().to_string()).collect();
    urls.extend(request_url);
    if let Some(list) = &cli.list {
        urls.extend(read_url_list(Path::new(list))?);
    }
    if stdin_piped && cli.list.is_none() && cli.url.is_empty() && cli.request.is_none() {
        urls.extend(read_url_lines(std::io::stdin().lock()));
    }

    let mut seen = std::collections::HashSet::new();
    urls.retain(|u| seen.insert(u.clone()));
    Ok(urls)
}

/// Request shape from the raw request file, with command-line headers
/// layered on top. An explicit `-X` replaces the file's method.
fn merge_template(base: Option<RequestTemplate>, cli: &Cli) -> RequestTemplate {
    let from_cli = cli.request_template();
    match base {
        Some(mut template) => {
            let overridden =
                |name: &str| from_cli.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name));
            template.headers.retain(|(name, _)| !overridden(name));
            template.headers.extend(from_cli.headers);
            if cli.method.is_some() {
                template.method = from_cli.method;
            }
            if from_cli.body.is_some() {
                template.body = from_cli.body;
            }
            template
        }
        None => from_cli,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    let default_level = if cli.silent { "error" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    set_color_enabled(!cli.no_color);

    let stdin_piped = !std::io::stdin().is_terminal();
    if let Err(e) = cli.validate(stdin_piped) {
        error!("{}", e);
        Cli::command().print_help()?;
        println!();
        return Err(e.into());
    }

    let config = cli.scan_config();
    let engine = Engine::new(&config)?;
    let sink = Aggregator::new(config.bounds);

    let (inputs, template) = if let Some(dir) = &cli.directory {
        let docs = walk_directory(Path::new(dir), &cli.exclude);
        info!("Loaded {} files from {}", docs.len(), dir);
        (docs, cli.request_template())
    } else {
        let raw = cli.request.as_deref().map(|p| read_raw_request(Path::new(p))).transpose()?;
        let request_url = raw.as_ref().map(|r| r.url.clone());
        let template = merge_template(raw.map(|r| r.template), &cli);
        let urls = url_targets(&cli, stdin_piped, request_url)?;
        info!("Loaded {} target URLs", urls.len());
        (urls.into_iter().map(Input::Url).collect::<Vec<_>>(), template)
    };

    if inputs.is_empty() {
        warn!("Nothing to analyse");
        return Ok(());
    }

    let fetcher = HttpFetcher::new(config.timeout, cli.proxy.as_deref(), template, config.delay)?;
    let stats = run(&engine, &fetcher, inputs, config.workers, &sink)?;
    info!(
        "Processed {} inputs ({} failed), {} candidates kept, {} unique parameters",
        stats.inputs, stats.failed, stats.discovered, stats.stored
    );

    let params = sink.snapshot(cli.sort);
    let options = cli.export_options();
    let records = build_records(&params, options.sus_only);

    if cli.report_sus {
        for rec in records.iter().filter(|r| r.is_suspicious) {
            if let Some(cat) = rec.suspicious_type {
                info!("Suspicious parameter {} [{}] {}", rec.name, cat, cat.description());
            }
        }
    }

    match &cli.output {
        Some(path) => {
            let sidecar = write_export(Path::new(path), &records, &options)?;
            info!("Wrote {} parameters to {}", records.len(), path);
            if let Some(side) = sidecar {
                info!("Wrote suspicious parameters to {}", side.display());
            }
        }
        None => print_console(&records, cli.include_origin),
    }

    let summary = sink.summary();
    info!("{} suspicious out of {}", summary.suspicious, summary.total);
    info!("Summary: {}", summary);
    info!("Completed in {:.2?}", start_time.elapsed());

    Ok(())
}
