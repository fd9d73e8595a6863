use anyhow::{anyhow, Context, Result};
use clap::{crate_version, App, AppSettings, Arg, ArgMatches};
use std::path::Path;

mod client;
mod config;

use client::{LoadModel, UploadClient};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let matches = App::new("voxloadctl")
        .version(crate_version!())
        .about("CLI for the voxload chunked upload server.")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::new("server")
                .long("server")
                .value_name("url")
                .takes_value(true)
                .help("Server to talk to, defaults to http://127.0.0.1:18888"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log every request"),
        )
        .subcommand(
            App::new("upload")
                .about("Upload a file in chunks and reassemble it on the server")
                .arg(Arg::new("file").required(true))
                .arg(
                    Arg::new("name")
                        .long("name")
                        .value_name("filename")
                        .takes_value(true)
                        .help("Name to store the file under, defaults to the local file name"),
                )
                .arg(chunk_size_arg()),
        )
        .subcommand(
            App::new("load-model")
                .about("Load previously uploaded artifacts into the engine")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_name("filename")
                        .takes_value(true)
                        .required(true),
                )
                .arg(artifact_arg("pytorch"))
                .arg(artifact_arg("onnx"))
                .arg(artifact_arg("cluster"))
                .arg(artifact_arg("feature"))
                .arg(artifact_arg("index"))
                .arg(
                    Arg::new("half")
                        .long("half")
                        .help("Run the model in half precision"),
                ),
        )
        .subcommand(
            App::new("extract")
                .about("Upload a dataset archive and unpack it on the server")
                .arg(Arg::new("archive").required(true))
                .arg(chunk_size_arg()),
        )
        .subcommand(
            App::new("model-type")
                .about("Show or switch the model type")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(App::new("get").about("Show the current model type"))
                .subcommand(
                    App::new("set")
                        .about("Switch to another model type")
                        .arg(Arg::new("kind").required(true)),
                ),
        )
        .subcommand(App::new("info").about("Show what the engine has loaded"))
        .subcommand(
            App::new("config")
                .about("Save default options")
                .arg(
                    Arg::new("chunk-size")
                        .long("chunk-size")
                        .value_name("bytes")
                        .takes_value(true),
                ),
        )
        .get_matches();

    let level = if matches.is_present("verbose") {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = config::read_default().await?;
    let client = UploadClient::new(&config.server(matches.value_of("server")))?;

    match matches.subcommand() {
        Some(("upload", matches)) => command_upload(&client, &config, matches).await?,
        Some(("load-model", matches)) => command_load_model(&client, matches).await?,
        Some(("extract", matches)) => command_extract(&client, &config, matches).await?,
        Some(("model-type", matches)) => command_model_type(&client, matches).await?,
        Some(("info", _matches)) => print_json(&client.info().await?)?,
        Some(("config", config_matches)) => {
            if let Some(server) = matches.value_of("server") {
                config.upload.server = Some(server.to_owned());
            }
            if let Some(chunk_size) = parse_chunk_size(config_matches)? {
                config.upload.chunk_size = Some(config.chunk_size(Some(chunk_size))?);
            }

            let path = config.save().await?;
            println!("Saved config to {}", path.display());
        }
        _ => unreachable!("clap requires a subcommand"),
    }

    Ok(())
}

fn chunk_size_arg() -> Arg<'static> {
    Arg::new("chunk-size")
        .long("chunk-size")
        .value_name("bytes")
        .takes_value(true)
        .help("Bytes per chunk, defaults to 1 MiB")
}

fn artifact_arg(name: &'static str) -> Arg<'static> {
    Arg::new(name)
        .long(name)
        .value_name("filename")
        .takes_value(true)
}

fn parse_chunk_size(matches: &ArgMatches) -> Result<Option<u64>> {
    matches
        .value_of("chunk-size")
        .map(|chunk_size| chunk_size.parse().context("parsing --chunk-size"))
        .transpose()
}

fn local_name<'a>(path: &'a Path, name: Option<&'a str>) -> Result<&'a str> {
    match name {
        Some(name) => Ok(name),
        None => path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("{} has no usable file name, use --name", path.display())),
    }
}

async fn command_upload(
    client: &UploadClient,
    config: &config::Config,
    matches: &ArgMatches,
) -> Result<()> {
    let path = Path::new(matches.value_of("file").expect("file must be set"));
    let name = local_name(path, matches.value_of("name"))?;
    let chunk_size = config.chunk_size(parse_chunk_size(matches)?)?;

    let chunks = client.upload_chunks(path, name, chunk_size).await?;
    let response = client.concat(name, chunks).await?;

    println!("Uploaded {} in {} chunks", name, chunks);
    if let Some(path) = response.get("path").and_then(|path| path.as_str()) {
        println!("Stored at: {}", path);
    }

    Ok(())
}

async fn command_load_model(client: &UploadClient, matches: &ArgMatches) -> Result<()> {
    let load = LoadModel {
        config: matches.value_of("config").expect("config must be set"),
        pytorch_model: matches.value_of("pytorch"),
        onnx_model: matches.value_of("onnx"),
        cluster_model: matches.value_of("cluster"),
        feature: matches.value_of("feature"),
        index: matches.value_of("index"),
        is_half: matches.is_present("half"),
    };

    print_json(&client.load_model(&load).await?)
}

async fn command_extract(
    client: &UploadClient,
    config: &config::Config,
    matches: &ArgMatches,
) -> Result<()> {
    let path = Path::new(matches.value_of("archive").expect("archive must be set"));
    let name = local_name(path, None)?;
    let chunk_size = config.chunk_size(parse_chunk_size(matches)?)?;

    let chunks = client.upload_chunks(path, name, chunk_size).await?;
    client.extract_voices(name, chunks).await?;

    println!("Extracted {}", name);

    Ok(())
}

async fn command_model_type(client: &UploadClient, matches: &ArgMatches) -> Result<()> {
    let response = match matches.subcommand() {
        Some(("set", matches)) => {
            let kind = matches.value_of("kind").expect("model type must be set");
            client.switch_model_type(kind).await?
        }
        _ => client.model_type().await?,
    };

    match response.get("vc").and_then(|kind| kind.as_str()) {
        Some(kind) => println!("{}", kind),
        None => print_json(&response)?,
    }

    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name() {
        let path = Path::new("/home/me/models/G_latest.pth");

        assert_eq!(local_name(path, None).unwrap(), "G_latest.pth");
        assert_eq!(local_name(path, Some("G_1.pth")).unwrap(), "G_1.pth");
        assert!(local_name(Path::new("/"), None).is_err());
    }
}
