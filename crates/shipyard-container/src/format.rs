//! Rendering declared options into middleware shell arguments.
//!
//! Every fragment starts with a space so fragments concatenate directly.

use shipyard_core::{OptionKey, Options};

/// Arguments shared by `container-create-child` and `container-create-ssh`:
/// JVM options, environment, profiles and version.
pub fn create_arguments(options: &Options) -> String {
    let mut args = String::new();

    let jvm_opts = options.values(OptionKey::JvmOpts);
    if !jvm_opts.is_empty() {
        args.push_str(&format!(" --jvm-opts \"{}\"", jvm_opts.join(" ")));
    }
    for env in options.values(OptionKey::Env) {
        args.push_str(&format!(" --env {env}"));
    }
    if let Some(java_home) = options.first(OptionKey::JavaHome) {
        args.push_str(&format!(" --env JAVA_HOME={java_home}"));
    }
    args.push_str(&profile_arguments(options));
    if let Some(version) = options.first(OptionKey::Version) {
        args.push_str(&format!(" --version {version}"));
    }
    args
}

/// ` --profile <p>` for every declared profile.
pub fn profile_arguments(options: &Options) -> String {
    options
        .values(OptionKey::Profile)
        .iter()
        .map(|p| format!(" --profile {p}"))
        .collect()
}

/// Arguments of `fabric:create`: the raw `fabric_create` option followed by
/// profiles.
pub fn fabric_create_arguments(options: &Options) -> String {
    let mut args = String::new();
    if let Some(raw) = options.first(OptionKey::FabricCreate) {
        args.push(' ');
        args.push_str(raw.trim());
    }
    args.push_str(&profile_arguments(options));
    args
}

/// Arguments of `fabric:join`. The coordination password falls back to
/// `default_password` when not declared.
pub fn join_arguments(options: &Options, default_password: &str) -> String {
    let password = options
        .first(OptionKey::ZookeeperPassword)
        .unwrap_or(default_password);
    let mut args = format!(" --zookeeper-password {password}");
    args.push_str(&profile_arguments(options));

    for (key, flag) in [
        (OptionKey::MaxPort, "--max-port"),
        (OptionKey::MinPort, "--min-port"),
        (OptionKey::Resolver, "--resolver"),
        (OptionKey::ManualIp, "--manual-ip"),
    ] {
        if let Some(value) = options.first(key) {
            args.push_str(&format!(" {flag} {value}"));
        }
    }
    args
}
