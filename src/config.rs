/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! User-defined parameters of the [skipchain service](crate::skipchain::service::SkipchainService) and
//! of the [collective signing engine](crate::cosi::engine::LocalCosi).

use typed_builder::TypedBuilder;

use crate::types::crypto_primitives::SigningKey;

/// Stores the user-defined parameters required to start a skipchain service, that is:
/// 1. The service's transport [keypair](ed25519_dalek::SigningKey). Its verifying key is the address
///    other services send messages to.
/// 2. Whether the service should [log](crate::logging) the events it emits.
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`

    Optional:
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the service's transport keypair. Required."))]
    pub me: SigningKey,
    #[builder(default = false, setter(doc = "Enable or disable logging of events. Optional, defaults to `false`."))]
    pub log_events: bool,
}

/// Parameters of the in-process [collective signing engine](crate::cosi::engine::LocalCosi).
#[derive(TypedBuilder, Clone, Debug)]
#[builder(builder_method(doc = "
    Create a builder for building a [CosiConfiguration]. Every parameter is optional:
    - `.branching_factor(...)`
    - `.max_signing_attempts(...)`
    - `.log_events(...)`
"))]
pub struct CosiConfiguration {
    #[builder(default = 2, setter(doc = "Set the maximum number of children of a signing tree node. Defaults to 2."))]
    pub branching_factor: usize,
    #[builder(default = 3, setter(doc = "Set how many rounds the root runs before giving up on a signature. Defaults to 3."))]
    pub max_signing_attempts: u32,
    #[builder(default = false, setter(doc = "Enable or disable logging of events. Defaults to `false`."))]
    pub log_events: bool,
}

impl Default for CosiConfiguration {
    fn default() -> Self {
        CosiConfiguration::builder().build()
    }
}
