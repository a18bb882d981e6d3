use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dreamina_engine::{Client, Credentials, GenerateRequest};

#[derive(Debug, Parser)]
#[command(
    name = "dreamina",
    version,
    about = "Generate images with the Volcengine Dreamina API"
)]
struct Cli {
    /// Text prompt describing the image to generate.
    #[arg(short, long)]
    prompt: String,
    /// Output file path for the generated image.
    #[arg(short, long)]
    output: PathBuf,
    #[arg(short = 'W', long, default_value_t = 1024)]
    width: u32,
    #[arg(short = 'H', long, default_value_t = 1024)]
    height: u32,
    /// Random seed for reproducibility.
    #[arg(short, long)]
    seed: Option<u32>,
    /// Access key; falls back to VOLCENGINE_AK.
    #[arg(long)]
    ak: Option<String>,
    /// Secret key; falls back to VOLCENGINE_SK.
    #[arg(long)]
    sk: Option<String>,
}

fn main() {
    match run() {
        Ok(()) => {}
        Err(err) => {
            eprintln!("dreamina error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let access_key = cli.ak.clone().or_else(|| non_empty_env("VOLCENGINE_AK"));
    let secret_key = cli.sk.clone().or_else(|| non_empty_env("VOLCENGINE_SK"));
    let (Some(access_key), Some(secret_key)) = (access_key, secret_key) else {
        bail!(
            "missing credentials: set VOLCENGINE_AK and VOLCENGINE_SK \
             or pass --ak and --sk"
        );
    };

    let credentials = Credentials::new(access_key, secret_key)?;
    let client = Client::new(credentials)?;

    println!("Generating image for prompt: '{}'", cli.prompt);
    println!("Image size: {}x{}", cli.width, cli.height);

    let mut request = GenerateRequest::new(cli.prompt.clone(), cli.output.clone());
    request.width = cli.width;
    request.height = cli.height;
    request.seed = cli.seed;

    let written = client
        .generate(&request)
        .context("image generation failed")?;
    println!("Image saved to: {} ({} bytes)", written.path.display(), written.bytes);
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
