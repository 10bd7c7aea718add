use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::Region;
use aws_sdk_ec2::types::Filter;
use aws_sdk_ssm::config::endpoint::{self, ResolveEndpoint};
use aws_types::service_config::{LoadServiceConfig, ServiceConfigKey};
use url::Url;

use crate::error::{ProxyError, Result};
use crate::host::InstanceFilter;
use crate::output::print_debug;

/// SSM document that tunnels SSH through session-manager-plugin.
pub const SSH_SESSION_DOCUMENT: &str = "AWS-StartSSHSession";

/// Target of the session, as found by `DescribeInstances`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRef {
    pub instance_id: String,
    pub availability_zone: String,
}

/// The `StartSession` request as sent to SSM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub target: String,
    pub document_name: String,
    pub port_number: String,
}

impl SessionRequest {
    pub fn ssh(instance_id: &str, port: u16) -> Self {
        Self {
            target: instance_id.to_string(),
            document_name: SSH_SESSION_DOCUMENT.to_string(),
            port_number: port.to_string(),
        }
    }
}

/// A started SSM session, plus where the plugin has to sign and send requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    pub stream_url: String,
    pub token_value: String,
    pub signing_region: String,
    pub endpoint: String,
}

/// The three AWS calls the proxy makes, plus session cleanup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudApi {
    /// First instance matching `filter`, in the order EC2 returns them.
    async fn find_instance(&self, filter: &InstanceFilter) -> Result<InstanceRef>;

    async fn send_public_key(&self, instance: &InstanceRef, user: &str, public_key: &str)
        -> Result<()>;

    async fn start_session(&self, request: &SessionRequest) -> Result<SessionHandle>;

    async fn terminate_session(&self, session_id: &str) -> Result<()>;
}

pub async fn get_aws_config(
    profile: Option<String>,
    region: Option<String>,
) -> Result<aws_config::SdkConfig> {
    // AWS configuration chain (in order of precedence):
    // 1. CLI arguments (--profile, --region)
    // 2. Environment variables (AWS_PROFILE, AWS_REGION)
    // 3. AWS shared config and credentials files
    let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

    if let Some(region_str) = region {
        let region_provider =
            RegionProviderChain::first_try(Region::new(region_str)).or_default_provider();
        config_loader = config_loader.region(region_provider);
    }

    if let Some(profile) = profile {
        config_loader = config_loader.profile_name(profile);
    }

    Ok(config_loader.load().await)
}

/// Options that decide which SSM endpoint the SDK talks to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointOptions {
    pub use_fips: bool,
    pub use_dual_stack: bool,
    /// `AWS_ENDPOINT_URL_SSM`, the `ssm` services section, or the global override.
    pub endpoint_url: Option<String>,
}

impl EndpointOptions {
    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        let service_endpoint = config.service_config().and_then(|conf| {
            ServiceConfigKey::builder()
                .service_id("SSM")
                .env("AWS_ENDPOINT_URL")
                .profile("endpoint_url")
                .build()
                .ok()
                .and_then(|key| conf.load_config(key))
        });

        Self {
            use_fips: config.use_fips().unwrap_or(false),
            use_dual_stack: config.use_dual_stack().unwrap_or(false),
            endpoint_url: service_endpoint.or_else(|| config.endpoint_url().map(String::from)),
        }
    }
}

/// Endpoint session-manager-plugin should use for SSM, as the SDK resolves it.
pub async fn ssm_endpoint(region: &str, options: &EndpointOptions) -> Result<String> {
    if let Some(endpoint) = &options.endpoint_url {
        Url::parse(endpoint)
            .map_err(|e| ProxyError::Config(format!("Invalid endpoint URL {}: {}", endpoint, e)))?;
    }

    let params = endpoint::Params::builder()
        .region(region)
        .use_fips(options.use_fips)
        .use_dual_stack(options.use_dual_stack)
        .set_endpoint(options.endpoint_url.clone())
        .build()
        .map_err(ProxyError::config)?;

    let resolved = endpoint::DefaultResolver::new()
        .resolve_endpoint(&params)
        .await
        .map_err(|e| ProxyError::Config(format!("Cannot resolve SSM endpoint: {}", e)))?;

    Ok(resolved.url().trim_end_matches('/').to_string())
}

pub struct AwsCloud {
    ec2: aws_sdk_ec2::Client,
    ec2ic: aws_sdk_ec2instanceconnect::Client,
    ssm: aws_sdk_ssm::Client,
    ssm_signing_region: String,
    ssm_endpoint: String,
    verbose: bool,
}

impl AwsCloud {
    pub async fn new(config: &aws_config::SdkConfig, verbose: bool) -> Result<Self> {
        let region = config
            .region()
            .map(|r| r.to_string())
            .ok_or_else(|| ProxyError::config("No AWS region configured"))?;
        let endpoint = ssm_endpoint(&region, &EndpointOptions::from_sdk_config(config)).await?;
        print_debug(&format!("SSM endpoint: {}", endpoint), verbose);

        Ok(Self::from_clients(
            aws_sdk_ec2::Client::new(config),
            aws_sdk_ec2instanceconnect::Client::new(config),
            aws_sdk_ssm::Client::new(config),
            region,
            endpoint,
            verbose,
        ))
    }

    pub fn from_clients(
        ec2: aws_sdk_ec2::Client,
        ec2ic: aws_sdk_ec2instanceconnect::Client,
        ssm: aws_sdk_ssm::Client,
        ssm_signing_region: String,
        ssm_endpoint: String,
        verbose: bool,
    ) -> Self {
        Self {
            ec2,
            ec2ic,
            ssm,
            ssm_signing_region,
            ssm_endpoint,
            verbose,
        }
    }
}

#[async_trait]
impl CloudApi for AwsCloud {
    async fn find_instance(&self, filter: &InstanceFilter) -> Result<InstanceRef> {
        let request = match filter {
            InstanceFilter::Name(name) => {
                print_debug(
                    &format!("Searching for instances with Name tag: '{}'", name),
                    self.verbose,
                );
                self.ec2
                    .describe_instances()
                    .filters(Filter::builder().name("tag:Name").values(name).build())
            }
            InstanceFilter::Id(id) => {
                print_debug(&format!("Looking up instance id: {}", id), self.verbose);
                self.ec2.describe_instances().instance_ids(id)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| ProxyError::remote(aws_sdk_ec2::error::DisplayErrorContext(e)))?;

        let described = match filter {
            InstanceFilter::Name(name) => format!("Name={}", name),
            InstanceFilter::Id(id) => id.clone(),
        };
        let instance = response
            .reservations()
            .first()
            .and_then(|r| r.instances().first())
            .ok_or_else(|| ProxyError::InstanceNotFound(described.clone()))?;

        let instance_id = instance
            .instance_id()
            .ok_or_else(|| ProxyError::InstanceNotFound(described.clone()))?
            .to_string();
        let availability_zone = instance
            .placement()
            .and_then(|p| p.availability_zone())
            .ok_or_else(|| {
                ProxyError::remote(format!("Instance {} has no availability zone", instance_id))
            })?
            .to_string();

        Ok(InstanceRef {
            instance_id,
            availability_zone,
        })
    }

    async fn send_public_key(
        &self,
        instance: &InstanceRef,
        user: &str,
        public_key: &str,
    ) -> Result<()> {
        self.ec2ic
            .send_ssh_public_key()
            .availability_zone(&instance.availability_zone)
            .instance_id(&instance.instance_id)
            .instance_os_user(user)
            .ssh_public_key(public_key)
            .send()
            .await
            .map_err(|e| {
                ProxyError::remote(aws_sdk_ec2instanceconnect::error::DisplayErrorContext(e))
            })?;
        Ok(())
    }

    async fn start_session(&self, request: &SessionRequest) -> Result<SessionHandle> {
        let response = self
            .ssm
            .start_session()
            .target(&request.target)
            .document_name(&request.document_name)
            .parameters("portNumber", vec![request.port_number.clone()])
            .send()
            .await
            .map_err(|e| ProxyError::remote(aws_sdk_ssm::error::DisplayErrorContext(e)))?;

        match (
            response.session_id(),
            response.stream_url(),
            response.token_value(),
        ) {
            (Some(session_id), Some(stream_url), Some(token_value)) => Ok(SessionHandle {
                session_id: session_id.to_string(),
                stream_url: stream_url.to_string(),
                token_value: token_value.to_string(),
                signing_region: self.ssm_signing_region.clone(),
                endpoint: self.ssm_endpoint.clone(),
            }),
            _ => Err(ProxyError::remote("Incomplete session response from AWS SSM")),
        }
    }

    async fn terminate_session(&self, session_id: &str) -> Result<()> {
        self.ssm
            .terminate_session()
            .session_id(session_id)
            .send()
            .await
            .map_err(|e| ProxyError::remote(aws_sdk_ssm::error::DisplayErrorContext(e)))?;
        Ok(())
    }
}
