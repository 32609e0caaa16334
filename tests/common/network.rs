use std::{
    collections::{HashMap, HashSet},
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use skipchain_rs::{
    networking::{Network, NetworkError},
    skipchain::messages::Message,
    types::crypto_primitives::VerifyingKey,
};

/// Peers that sends are currently failing to. Shared by every stub of one mock network.
#[derive(Clone, Default)]
pub(crate) struct Partition(Arc<Mutex<HashSet<VerifyingKey>>>);

impl Partition {
    pub(crate) fn disconnect(&self, peer: VerifyingKey) {
        self.0.lock().unwrap().insert(peer);
    }

    pub(crate) fn reconnect(&self, peer: &VerifyingKey) {
        self.0.lock().unwrap().remove(peer);
    }

    fn is_disconnected(&self, peer: &VerifyingKey) -> bool {
        self.0.lock().unwrap().contains(peer)
    }
}

/// A mock network stub which passes messages from and to threads using channels.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    my_verifying_key: VerifyingKey,
    all_peers: HashMap<VerifyingKey, Sender<(VerifyingKey, Message)>>,
    inbox: Arc<Mutex<Receiver<(VerifyingKey, Message)>>>,
    partition: Partition,
}

impl Network for NetworkStub {
    fn send(&mut self, peer: VerifyingKey, message: Message) -> Result<(), NetworkError> {
        if self.partition.is_disconnected(&peer) {
            return Err(NetworkError::Disconnected(peer));
        }
        match self.all_peers.get(&peer) {
            Some(sender) => sender
                .send((self.my_verifying_key, message))
                .map_err(|_| NetworkError::Disconnected(peer)),
            None => Err(NetworkError::UnknownPeer(peer)),
        }
    }

    fn recv(&mut self) -> Option<(VerifyingKey, Message)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(o_m) => Some(o_m),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!(),
        }
    }
}

pub(crate) fn mock_network(peers: impl Iterator<Item = VerifyingKey>) -> (Vec<NetworkStub>, Partition) {
    let mut all_peers = HashMap::new();
    let partition = Partition::default();
    let peer_and_inboxes: Vec<(VerifyingKey, Receiver<(VerifyingKey, Message)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    let stubs = peer_and_inboxes
        .into_iter()
        .map(|(my_verifying_key, inbox)| NetworkStub {
            my_verifying_key,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
            partition: partition.clone(),
        })
        .collect();
    (stubs, partition)
}
