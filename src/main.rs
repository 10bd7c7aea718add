use anyhow::Result;
use clap::Parser;

mod aws;
mod config;
mod error;
mod host;
mod output;
mod plugin;
mod proxy;
mod signals;

use crate::aws::{get_aws_config, AwsCloud};
use crate::config::{Defaults, Params, ProxyArgs};
use crate::output::{print_debug, print_error};
use crate::plugin::SystemPlugin;

#[derive(Parser, Debug)]
#[command(name = "ec2-ssh-proxy")]
#[command(about = "SSH ProxyCommand for EC2 instances via EC2 Instance Connect and SSM")]
#[command(after_help = "Example ~/.ssh/config:\n\n  Host ec2.*\n      ProxyCommand ec2-ssh-proxy %h %p")]
#[command(version)]
struct Cli {
    /// Host name given by ssh (%h)
    host: String,

    /// Port on the instance (%p)
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Host name pattern; {name}, {id} and {profile} capture parts of HOST
    #[arg(long = "pattern", default_value = Defaults::PATTERN)]
    pattern: String,

    /// AWS credentials profile name (overrides {profile} in the pattern)
    #[arg(long = "profile")]
    profile: Option<String>,

    /// SSH public key file path
    #[arg(long = "public-key", default_value = Defaults::PUBLIC_KEY)]
    public_key: String,

    /// OS user on the EC2 instance
    #[arg(long = "user", default_value = Defaults::USER)]
    user: String,

    /// AWS region to use (defaults to AWS_REGION env var or config file)
    #[arg(short = 'r', long = "region")]
    region: Option<String>,

    /// Enable verbose output on stderr
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

impl Cli {
    fn proxy_args(&self) -> ProxyArgs {
        ProxyArgs {
            host: self.host.clone(),
            port: self.port,
            pattern: self.pattern.clone(),
            profile: self.profile.clone(),
            public_key: self.public_key.clone(),
            user: self.user.clone(),
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let verbose = cli.verbose;

    let params = Params::assemble(&cli.proxy_args())?;

    print_debug(&format!("Host: {} (pattern {})", cli.host, cli.pattern), verbose);
    print_debug(&format!("Filter: {:?}", params.filter), verbose);
    print_debug(
        &format!("Profile: {}", params.profile.as_deref().unwrap_or("default")),
        verbose,
    );
    print_debug(
        &format!(
            "Region: {}",
            cli.region.as_deref().unwrap_or("default (from config)")
        ),
        verbose,
    );

    let config = get_aws_config(params.profile.clone(), cli.region.clone()).await?;
    let cloud = AwsCloud::new(&config, verbose).await?;
    let plugin = SystemPlugin::default();

    proxy::run(&params, &cloud, &plugin, verbose).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    output::init_color();

    if let Err(e) = run(cli).await {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}
