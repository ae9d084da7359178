use std::{
    collections::BTreeMap,
    fs::{self, File, create_dir_all},
    io::Write,
    path::{Path, PathBuf},
};

use clap::Parser;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, error};

use crate::{
    api::ClusterLogForwarder,
    generator::{self, GeneratorError, Options},
    secrets::Secrets,
    validation::{self, ValidationErrors},
};

#[derive(Parser, Debug)]
#[command(rename_all = "kebab-case")]
pub struct Opts {
    /// Path to a `ClusterLogForwarder` manifest in YAML.
    pub forwarder: PathBuf,

    /// Directory holding referenced secrets, laid out like the collector's secret mount:
    /// `<dir>/<secret-name>/<key>`.
    #[arg(long)]
    pub secrets_dir: Option<PathBuf>,

    /// Write the config to this file instead of stdout. Existing files are not overwritten.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Minimum TLS version applied to outputs that do not set one.
    #[arg(long)]
    pub tls_min_version: Option<String>,

    /// Comma separated cipher suites applied to outputs that do not set any.
    #[arg(long, value_delimiter = ',')]
    pub tls_ciphers: Vec<String>,
}

#[derive(Debug, Snafu)]
pub enum GenerateError {
    #[snafu(display("could not read {:?}: {}", path, source))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("{:?} is not a valid forwarder manifest: {}", path, source))]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("{}", source))]
    Invalid { source: ValidationErrors },

    #[snafu(display("{}", source))]
    Generate { source: GeneratorError },

    #[snafu(display("{:?} already exists", path))]
    Exists { path: PathBuf },

    #[snafu(display("failed to write {:?}: {}", path, source))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl GenerateError {
    const fn exit_code(&self) -> exitcode::ExitCode {
        match self {
            Self::Read { .. } => exitcode::NOINPUT,
            Self::Parse { .. } | Self::Invalid { .. } => exitcode::DATAERR,
            Self::Generate { .. } => exitcode::CONFIG,
            Self::Exists { .. } | Self::Write { .. } => exitcode::CANTCREAT,
        }
    }
}

/// Loads secrets from `<dir>/<secret-name>/<key>` files. Hidden entries are skipped, which
/// leaves out the `..data` links of a projected volume.
pub fn load_secrets_dir(dir: &Path) -> Result<Secrets, GenerateError> {
    let mut secrets = Secrets::new();
    for secret in read_dir(dir)? {
        if !secret.is_dir() {
            continue;
        }
        let mut data = BTreeMap::new();
        for key in read_dir(&secret)? {
            if !key.is_file() {
                continue;
            }
            let value = fs::read(&key).context(ReadSnafu { path: key.clone() })?;
            data.insert(file_name(&key), value);
        }
        debug!(message = "Loaded secret.", secret = %file_name(&secret), keys = data.len());
        secrets.insert(file_name(&secret), data);
    }
    Ok(secrets)
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, GenerateError> {
    let entries = fs::read_dir(dir).context(ReadSnafu { path: dir })?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.context(ReadSnafu { path: dir })?.path();
        if !file_name(&path).starts_with('.') {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Validates the manifest at `opts.forwarder` and renders its collector config.
pub fn generate_config(opts: &Opts) -> Result<String, GenerateError> {
    let manifest = fs::read_to_string(&opts.forwarder).context(ReadSnafu {
        path: &opts.forwarder,
    })?;
    let forwarder: ClusterLogForwarder =
        serde_yaml::from_str(&manifest).context(ParseSnafu {
            path: &opts.forwarder,
        })?;
    let secrets = match &opts.secrets_dir {
        Some(dir) => load_secrets_dir(dir)?,
        None => Secrets::new(),
    };

    validation::validate(&forwarder, &secrets).context(InvalidSnafu)?;
    let options = Options::for_forwarder(
        &forwarder,
        opts.tls_min_version.clone(),
        opts.tls_ciphers.clone(),
    )
    .context(GenerateSnafu)?;
    generator::generate(&forwarder, &secrets, &options).context(GenerateSnafu)
}

fn write_config(path: &Path, body: &str) -> Result<(), GenerateError> {
    // If the file exists, we don't want to overwrite, that's just rude.
    ensure!(!path.exists(), ExistsSnafu { path });
    if let Some(directory) = path.parent() {
        create_dir_all(directory).context(WriteSnafu { path })?;
    }
    File::create(path)
        .and_then(|mut file| file.write_all(body.as_bytes()))
        .context(WriteSnafu { path })
}

pub fn cmd(opts: &Opts) -> exitcode::ExitCode {
    let result = generate_config(opts).and_then(|config| match &opts.file {
        Some(path) => write_config(path, &config),
        None => {
            #[allow(clippy::print_stdout)]
            {
                print!("{config}");
            }
            Ok(())
        }
    });
    match result {
        Ok(()) => exitcode::OK,
        Err(error) => {
            error!(message = "Failed to generate collector config.", %error);
            #[allow(clippy::print_stderr)]
            {
                eprintln!("{error}");
            }
            error.exit_code()
        }
    }
}
