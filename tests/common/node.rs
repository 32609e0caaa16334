use std::sync::Arc;

use skipchain_rs::{
    config::{Configuration, CosiConfiguration},
    cosi::engine::{CosiNode, LocalCosi},
    skipchain::{messages::Reply, service::SkipchainService},
    types::{
        crypto_primitives::{Keypair, OsRng, PublicKey, SigningKey, VerifyingKey},
        roster::{Roster, ServerIdentity},
    },
};

use super::network::{mock_network, NetworkStub, Partition};

/// The keys of one server: its transport key and its collective signing key.
pub(crate) struct Keys {
    pub(crate) signing_key: SigningKey,
    pub(crate) keypair: Keypair,
}

impl Keys {
    pub(crate) fn generate() -> Keys {
        let mut csprng = OsRng;
        Keys {
            signing_key: SigningKey::generate(&mut csprng),
            keypair: Keypair::generate(&mut csprng),
        }
    }

    pub(crate) fn identity(&self) -> ServerIdentity {
        ServerIdentity::new(self.signing_key.verifying_key(), self.keypair.public())
    }
}

/// Generate `size` servers, and the roster they make up in generation order.
pub(crate) fn servers(size: usize) -> (Vec<Keys>, Roster) {
    let keys: Vec<Keys> = (0..size).map(|_| Keys::generate()).collect();
    let roster = Roster::new(keys.iter().map(Keys::identity).collect());
    (keys, roster)
}

/// An in-process collective signer over `keys`.
pub(crate) fn local_cosi(keys: &[Keys], config: CosiConfiguration) -> LocalCosi {
    let nodes = keys
        .iter()
        .map(|keys| CosiNode::new(keys.identity(), keys.keypair.clone()))
        .collect();
    LocalCosi::new(config, nodes)
}

pub(crate) struct Node {
    identity: ServerIdentity,
    service: SkipchainService<NetworkStub, LocalCosi>,
}

impl Node {
    pub(crate) fn service(&self) -> &SkipchainService<NetworkStub, LocalCosi> {
        &self.service
    }

    pub(crate) fn address(&self) -> VerifyingKey {
        self.identity.address
    }

    pub(crate) fn public(&self) -> PublicKey {
        self.identity.public
    }

    pub(crate) fn poll(&self) -> Vec<(VerifyingKey, Reply)> {
        self.service.poll_network()
    }
}

/// A roster of skipchain services, connected by a mock network and sharing one collective signer.
pub(crate) struct Cluster {
    pub(crate) roster: Roster,
    pub(crate) cosi: Arc<LocalCosi>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) partition: Partition,
    /// A network handle that belongs to no server, for sending requests.
    pub(crate) client: NetworkStub,
}

impl Cluster {
    pub(crate) fn new(size: usize) -> Cluster {
        Cluster::with_cosi_config(size, CosiConfiguration::default())
    }

    pub(crate) fn with_cosi_config(size: usize, cosi_config: CosiConfiguration) -> Cluster {
        let (keys, roster) = servers(size);
        let cosi = Arc::new(local_cosi(&keys, cosi_config));
        let client_key = SigningKey::generate(&mut OsRng).verifying_key();
        let (mut networks, partition) = mock_network(
            keys.iter()
                .map(|keys| keys.signing_key.verifying_key())
                .chain([client_key]),
        );
        let client = networks.pop().unwrap();

        let nodes = keys
            .into_iter()
            .zip(networks)
            .map(|(keys, network)| {
                let identity = keys.identity();
                let config = Configuration::builder().me(keys.signing_key).log_events(true).build();
                Node {
                    identity,
                    service: SkipchainService::new(config, network, cosi.clone()),
                }
            })
            .collect();

        Cluster {
            roster,
            cosi,
            nodes,
            partition,
            client,
        }
    }

    /// The node proposals are sent to.
    pub(crate) fn leader(&self) -> &Node {
        &self.nodes[0]
    }

    /// Let every node handle the messages waiting in its inbox.
    pub(crate) fn poll_all(&self) {
        for node in &self.nodes {
            node.poll();
        }
    }
}
