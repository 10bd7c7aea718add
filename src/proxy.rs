use crate::aws::{CloudApi, SessionRequest};
use crate::config::Params;
use crate::error::{ProxyError, Result};
use crate::output::{print_debug, print_info, print_warning};
use crate::plugin::{PluginInvocation, SessionManagerPlugin};

/// Locates the instance, authorizes the key, starts the SSM session and hands
/// stdio over to the plugin. Stops at the first failure.
pub async fn run<C, P>(params: &Params, cloud: &C, plugin: &P, verbose: bool) -> Result<()>
where
    C: CloudApi,
    P: SessionManagerPlugin,
{
    let instance = cloud.find_instance(&params.filter).await?;
    print_debug(
        &format!(
            "Instance ID: {} ({})",
            instance.instance_id, instance.availability_zone
        ),
        verbose,
    );

    cloud
        .send_public_key(&instance, &params.user, &params.public_key)
        .await?;
    print_debug(
        &format!("Public key sent for OS user '{}'", params.user),
        verbose,
    );

    // Never start a session the plugin could not take over.
    plugin.check()?;

    let request = SessionRequest::ssh(&instance.instance_id, params.port);
    let handle = cloud.start_session(&request).await?;
    print_debug(&format!("Session started: {}", handle.session_id), verbose);

    let result = PluginInvocation::new(&request, &handle, params.profile_name())
        .and_then(|invocation| plugin.start(&invocation));

    if let Err(ProxyError::PluginNotFound) = result {
        match cloud.terminate_session(&handle.session_id).await {
            Ok(()) => print_info(&format!("Session terminated: {}", handle.session_id)),
            Err(e) => print_warning(&format!(
                "Failed to terminate session {}: {}",
                handle.session_id, e
            )),
        }
    }

    result
}
