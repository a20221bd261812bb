//! Command line interface.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use missive::config::Config;
use missive::http::body::{Data, Form, NamedFile};
use missive::http::multipart::{FileContent, FilePart};
use missive::http::parser::read_response;
use missive::http::request::RequestSpec;
use missive::http::response::ResponseMessage;
use missive::http::writer::MessageWriter;

#[derive(Parser)]
#[command(name = "missive")]
#[command(about = "Prepare HTTP requests and inspect captured responses")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a prepared request in HTTP/1.1 wire form
    Prepare(PrepareArgs),
    /// Run a captured HTTP response through the body pipeline
    Inspect(InspectArgs),
}

#[derive(clap::Args)]
pub struct PrepareArgs {
    /// Request method (case-insensitive)
    pub method: String,

    pub url: String,

    /// Header as "Name: value"
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Form field as key=value
    #[arg(short = 'd', long = "data")]
    pub data: Vec<String>,

    /// Raw body sent as-is
    #[arg(long, conflicts_with_all = ["data", "json"])]
    pub data_raw: Option<String>,

    /// JSON body
    #[arg(long)]
    pub json: Option<String>,

    /// Multipart field as name=value, or name=@path to upload a file
    #[arg(short = 'F', long = "form")]
    pub files: Vec<String>,

    /// Query parameter as key=value
    #[arg(short = 'p', long = "param")]
    pub params: Vec<String>,

    /// Basic auth as user:password
    #[arg(short = 'u', long = "user")]
    pub auth: Option<String>,

    /// Cookie as name=value
    #[arg(short = 'b', long = "cookie")]
    pub cookies: Vec<String>,

    /// Skip the configured default headers
    #[arg(long)]
    pub no_default_headers: bool,
}

#[derive(clap::Args)]
pub struct InspectArgs {
    /// File holding a raw HTTP/1.1 response
    pub file: PathBuf,

    /// URL to report the response as coming from
    #[arg(long, default_value = "")]
    pub url: String,

    /// Print the body line by line
    #[arg(long, conflicts_with = "json")]
    pub lines: bool,

    /// Line delimiter used with --lines instead of universal newlines
    #[arg(long, requires = "lines")]
    pub delimiter: Option<String>,

    /// Parse the body as JSON and pretty-print it
    #[arg(long)]
    pub json: bool,

    /// Override the response encoding
    #[arg(long)]
    pub encoding: Option<String>,

    /// Copy the body bytes to stdout undecoded
    #[arg(long, conflicts_with_all = ["lines", "json"])]
    pub raw: bool,
}

pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Commands::Prepare(args) => prepare(args, &config).await,
        Commands::Inspect(args) => {
            tokio::task::spawn_blocking(move || inspect(args, &config)).await?
        }
    }
}

fn split_pair<'a>(arg: &'a str, sep: char, what: &str) -> anyhow::Result<(&'a str, &'a str)> {
    match arg.split_once(sep) {
        Some(pair) => Ok(pair),
        None => bail!("invalid {what} {arg:?}: expected a '{sep}' separator"),
    }
}

pub fn build_spec(args: &PrepareArgs, config: &Config) -> anyhow::Result<RequestSpec> {
    let mut spec = RequestSpec::new(args.method.as_str(), args.url.as_str());

    for header in &args.headers {
        let (name, value) = split_pair(header, ':', "header")?;
        spec = spec.header(name.trim(), value.trim_start());
    }
    if !args.no_default_headers {
        for (name, value) in &config.default_headers {
            if !spec.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name)) {
                spec = spec.header(name.as_str(), value.as_str());
            }
        }
    }

    let mut form = Form::new();
    for field in &args.data {
        let (key, value) = split_pair(field, '=', "form field")?;
        form.push(key, value);
    }
    for field in &args.files {
        let (name, value) = split_pair(field, '=', "multipart field")?;
        match value.strip_prefix('@') {
            Some(path) => {
                let file = NamedFile::open(path).with_context(|| format!("opening {path}"))?;
                spec = spec.file(name, FilePart::new(FileContent::reader(file)));
            }
            None => form.push(name, value),
        }
    }
    if let Some(raw) = &args.data_raw {
        spec = spec.data(Data::Text(raw.clone()));
    } else if !form.is_empty() {
        spec = spec.data(form);
    }

    if let Some(json) = &args.json {
        let value: serde_json::Value =
            serde_json::from_str(json).context("parsing --json payload")?;
        spec = spec.json(value);
    }

    if !args.params.is_empty() {
        let mut params = Form::new();
        for param in &args.params {
            let (key, value) = split_pair(param, '=', "query parameter")?;
            params.push(key, value);
        }
        spec = spec.params(params);
    }

    if let Some(auth) = &args.auth {
        let (user, pass) = auth.split_once(':').unwrap_or((auth.as_str(), ""));
        spec = spec.auth((user, pass));
    }

    if !args.cookies.is_empty() {
        let mut pairs = Vec::new();
        for cookie in &args.cookies {
            let (name, value) = split_pair(cookie, '=', "cookie")?;
            pairs.push((name.to_string(), value.to_string()));
        }
        spec = spec.cookies(pairs);
    }

    Ok(spec)
}

async fn prepare(args: PrepareArgs, config: &Config) -> anyhow::Result<()> {
    let spec = build_spec(&args, config)?;
    let prepared = spec.prepare()?;

    tracing::info!(method = %prepared.method(), url = prepared.url(), "Request prepared");

    let mut writer = MessageWriter::new(&prepared)?;
    let mut stdout = tokio::io::stdout();
    writer.write_to(&mut stdout).await?;
    Ok(())
}

fn inspect(args: InspectArgs, config: &Config) -> anyhow::Result<()> {
    let file = File::open(&args.file)
        .with_context(|| format!("opening {}", args.file.display()))?;
    let mut response = read_response(BufReader::new(file), &args.url)?;

    if let Some(encoding) = &args.encoding {
        response.set_encoding(Some(encoding.clone()));
    }

    tracing::info!(
        status = response.status_code(),
        reason = response.reason(),
        encoding = response.encoding().unwrap_or("-"),
        "Response head"
    );
    if !response.ok() {
        tracing::warn!(status = response.status_code(), "Response is an error status");
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if args.raw {
        for chunk in response.iter_content(config.content_chunk_size)? {
            out.write_all(&chunk?)?;
        }
    } else if args.json {
        let value: serde_json::Value = response.json()?;
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    } else if args.lines {
        print_lines(&mut response, &args, config, &mut out)?;
    } else {
        writeln!(out, "{}", response.text()?)?;
    }

    response.close();
    out.flush()?;
    Ok(())
}

fn print_lines(
    response: &mut ResponseMessage,
    args: &InspectArgs,
    config: &Config,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let chunk_size = config.iter_chunk_size;
    if response.encoding().is_some() {
        for line in response.iter_text_lines(chunk_size, args.delimiter.as_deref())? {
            writeln!(out, "{}", line?)?;
        }
    } else {
        let delimiter = args.delimiter.as_deref().map(str::as_bytes);
        for line in response.iter_lines(chunk_size, delimiter)? {
            writeln!(out, "{}", String::from_utf8_lossy(&line?))?;
        }
    }
    Ok(())
}
