//! Tests for the skipchain service: proposal, chain traversal, forward links, and propagation.
//!
//! Every test sets up a [Cluster] of services sharing one roster, connected by a mock network. The
//! services deliver propagated blocks to each other only when they are polled.

mod common;

use std::{sync::Arc, thread};

use log::LevelFilter;
use skipchain_rs::{
    config::{Configuration, CosiConfiguration},
    cosi::engine::{Behaviour, CollectiveSigner},
    networking::{Network, NetworkError},
    skipchain::{
        messages::{GetUpdateChain, Message, ProposeSkipBlock, Reply, Request},
        service::{SkipchainError, SkipchainService},
        verifiers::{verify_none, VerifierRegistry, VERIFY_NONE},
    },
    types::{
        basic::{BlockIndex, CryptoHash, Data, SkipBlockID, VerifierID},
        block::{forward_link_message, BlockLink, SkipBlock},
        crypto_primitives::{hash, OsRng, SigningKey},
    },
};

use common::{
    logging::{first_seven_base64_chars, setup_logger},
    network::mock_network,
    node::{local_cosi, servers, Cluster},
};

fn block(cluster: &Cluster, data: &[u8]) -> SkipBlock {
    SkipBlock::new(cluster.roster.clone(), Data::new(data.to_vec()))
}

/// Propose `data` on top of `latest` at the leader, and deliver the propagated blocks everywhere.
fn propose(cluster: &Cluster, latest: Option<&SkipBlock>, data: &[u8]) -> SkipBlock {
    let reply = cluster
        .leader()
        .service()
        .propose_skip_block(latest.map(|b| b.hash), block(cluster, data))
        .unwrap();
    cluster.poll_all();
    log::debug!(
        "proposed {} at index {}",
        first_seven_base64_chars(&reply.latest.hash.bytes()),
        reply.latest.index
    );
    reply.latest
}

#[test]
fn genesis_block_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(4);

    let reply = cluster
        .leader()
        .service()
        .propose_skip_block(None, block(&cluster, b""))
        .unwrap();
    let genesis = reply.latest;

    // 1. The genesis block is first in its chain, with a random filler as its back link.
    assert!(reply.previous.is_none());
    assert_eq!(genesis.index, BlockIndex::genesis());
    assert_eq!(genesis.height, 1);
    assert_eq!(genesis.back_link.len(), 1);
    assert!(!genesis.back_link[0].is_zero());
    assert_eq!(genesis.verifier_id, VERIFY_NONE);
    assert!(genesis.forward_link.is_empty());

    // 2. Its hash is a deterministic function of its content.
    assert_eq!(genesis.hash, genesis.calculate_hash());
    assert_eq!(genesis.clone().calculate_hash(), genesis.hash);
    let mut changed = genesis.clone();
    changed.data = Data::new(b"x".to_vec());
    assert_ne!(changed.calculate_hash(), genesis.hash);
    let mut changed = genesis.clone();
    changed.index = BlockIndex::new(2);
    assert_ne!(changed.calculate_hash(), genesis.hash);
    let mut changed = genesis.clone();
    changed.height = 2;
    assert_ne!(changed.calculate_hash(), genesis.hash);
    let mut changed = genesis.clone();
    changed.maximum_height += 1;
    assert_ne!(changed.calculate_hash(), genesis.hash);
    let mut changed = genesis.clone();
    changed.verifier_id = VerifierID::new(7);
    assert_ne!(changed.calculate_hash(), genesis.hash);
    let mut changed = genesis.clone();
    changed.roster = servers(4).1;
    assert_ne!(changed.calculate_hash(), genesis.hash);
    let mut changed = genesis.clone();
    changed.back_link = vec![CryptoHash::zero()];
    assert_ne!(changed.calculate_hash(), genesis.hash);

    // 3. Links and seals added after creation leave the hash alone.
    let mut linked = genesis.clone();
    linked.forward_link = vec![BlockLink::new(hash(b"successor"))];
    linked.child_skip_list = Some(BlockLink::new(hash(b"child chain")));
    linked.parent_block = Some(hash(b"parent chain"));
    linked.signature = None;
    assert_eq!(linked.calculate_hash(), genesis.hash);

    // 4. It is sealed by its roster.
    assert!(genesis.verify_signature());
    assert!(!changed.verify_signature());
    assert!(!linked.verify_signature());

    // 5. Every server in the roster receives it.
    cluster.poll_all();
    for node in &cluster.nodes {
        assert_eq!(node.service().skip_block(&genesis.hash), Some(genesis.clone()));
    }

    // 6. Two genesis blocks with the same content still get different back links, hence hashes.
    let other = propose(&cluster, None, b"");
    assert_ne!(other.back_link, genesis.back_link);
    assert_ne!(other.hash, genesis.hash);
}

#[test]
fn chain_extension_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(4);
    let genesis = propose(&cluster, None, b"");

    let reply = cluster
        .leader()
        .service()
        .propose_skip_block(Some(genesis.hash), block(&cluster, b"one"))
        .unwrap();
    let previous = reply.previous.unwrap();
    let b1 = reply.latest;

    assert_eq!(Some(b1.index), genesis.index.checked_add(1));
    assert_eq!(b1.back_link, vec![genesis.hash]);
    assert_eq!(b1.verifier_id, genesis.verifier_id);
    assert!(b1.verify_signature());

    // The predecessor now links forward to the new block, and the link is signed by its roster.
    assert_eq!(previous.hash, genesis.hash);
    assert_eq!(previous.forward_link.len(), 1);
    let link = &previous.forward_link[0];
    assert_eq!(link.hash, b1.hash);
    assert!(link.verify(&genesis.hash, &genesis.roster));
    assert!(link
        .signature
        .as_ref()
        .unwrap()
        .is_correct(&genesis.roster, &forward_link_message(&genesis.hash, &b1.hash)));
    assert!(!link.verify(&b1.hash, &genesis.roster));

    cluster.poll_all();
    for node in &cluster.nodes {
        assert_eq!(node.service().skip_block(&genesis.hash), Some(previous.clone()));
        assert_eq!(node.service().skip_block(&b1.hash), Some(b1.clone()));
    }
}

#[test]
fn end_to_end_update_chain_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(5);

    // 1. Create G, then B1 on top of G, then B2 on top of B1.
    let g = propose(&cluster, None, b"");
    let b1 = propose(&cluster, Some(&g), b"B1");
    let b2 = propose(&cluster, Some(&b1), b"B2");
    assert_eq!(b2.index, BlockIndex::new(3));

    // 2. Every server returns [G, B1, B2], however often it is asked.
    for node in &cluster.nodes {
        for _ in 0..3 {
            let update = node.service().get_update_chain(&g.hash).unwrap();
            let hashes: Vec<SkipBlockID> = update.iter().map(|b| b.hash).collect();
            assert_eq!(hashes, vec![g.hash, b1.hash, b2.hash]);
            let indices: Vec<u64> = update.iter().map(|b| b.index.int()).collect();
            assert_eq!(indices, vec![1, 2, 3]);
        }
    }

    // 3. Starting further up the chain returns only the rest of it.
    let update = cluster.leader().service().get_update_chain(&b1.hash).unwrap();
    assert_eq!(update.len(), 2);
    assert_eq!(update.last().unwrap().hash, b2.hash);

    // 4. An unknown start block is an error.
    let unknown = hash(b"unknown");
    assert_eq!(
        cluster.leader().service().get_update_chain(&unknown),
        Err(SkipchainError::UnknownBlock { id: unknown })
    );
}

#[test]
fn concurrent_double_extension_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(4);
    let genesis = propose(&cluster, None, b"");

    // 1. Two proposals race to extend the genesis block.
    let service = cluster.leader().service();
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = [b"left".as_slice(), b"right".as_slice()]
            .into_iter()
            .map(|data| {
                let proposed = block(&cluster, data);
                s.spawn(move || service.propose_skip_block(Some(genesis.hash), proposed))
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    // 2. Exactly one of them wins.
    let winners: Vec<SkipBlock> = results.iter().filter_map(|r| r.as_ref().ok()).map(|r| r.latest.clone()).collect();
    let losers: Vec<&SkipchainError> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(
        losers,
        vec![&SkipchainError::VerificationFailed { verifier: VERIFY_NONE }]
    );
    let stored = service.skip_block(&genesis.hash).unwrap();
    assert_eq!(stored.forward_link[0].hash, winners[0].hash);

    // 3. Any later attempt to extend the genesis block fails as well.
    assert_eq!(
        service
            .propose_skip_block(Some(genesis.hash), block(&cluster, b"late"))
            .unwrap_err(),
        SkipchainError::VerificationFailed { verifier: VERIFY_NONE }
    );
    cluster.poll_all();
}

#[test]
fn proposal_lookup_failures_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(3);
    let service = cluster.leader().service();
    let unknown = hash(b"unknown");

    assert_eq!(
        service.propose_skip_block(Some(unknown), block(&cluster, b"")).unwrap_err(),
        SkipchainError::PredecessorNotFound { id: unknown }
    );
    assert_eq!(
        service
            .handle_propose_skip_block(ProposeSkipBlock {
                latest: Some(unknown),
                proposed: block(&cluster, b""),
            })
            .unwrap_err(),
        SkipchainError::LatestNotFound { id: unknown }
    );
    assert!(service.is_empty());

    // The zero hash asks for a new chain.
    let reply = service
        .propose_skip_block(Some(CryptoHash::zero()), block(&cluster, b""))
        .unwrap();
    assert!(reply.previous.is_none());
    assert!(reply.latest.is_genesis());
}

#[test]
fn peer_proposal_inherits_chain_parameters_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(3);
    let genesis = propose(&cluster, None, b"");

    let mut proposed = block(&cluster, b"sneaky");
    proposed.maximum_height = 7;
    proposed.verifier_id = VerifierID::new(9);
    proposed.parent_block = Some(hash(b"some other chain"));

    let reply = cluster
        .leader()
        .service()
        .handle_request(Request::ProposeSkipBlock(ProposeSkipBlock {
            latest: Some(genesis.hash),
            proposed,
        }))
        .unwrap();
    let Reply::ProposedSkipBlock(reply) = reply else {
        panic!("unexpected reply");
    };
    assert_eq!(reply.latest.maximum_height, genesis.maximum_height);
    assert_eq!(reply.latest.verifier_id, genesis.verifier_id);
    assert_eq!(reply.latest.parent_block, genesis.parent_block);
    assert_eq!(reply.latest.back_link, vec![genesis.hash]);
    cluster.poll_all();
}

#[test]
fn forward_signature_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(4);
    let service = cluster.leader().service();
    let genesis = propose(&cluster, None, b"");

    // 1. A candidate that does not list the target in its back links is refused, signed or not.
    let mut stranger = block(&cluster, b"stranger");
    stranger.back_link = vec![hash(b"somewhere else")];
    assert_eq!(
        service.forward_signature(&genesis.hash, stranger.clone()),
        Err(SkipchainError::NotInBackLinks { target: genesis.hash })
    );
    let signed_stranger = service.sign_block(candidate_of(&cluster, &genesis)).map(|mut b| {
        b.back_link = vec![hash(b"somewhere else")];
        b
    });
    assert_eq!(
        service.forward_signature(&genesis.hash, signed_stranger.unwrap()),
        Err(SkipchainError::NotInBackLinks { target: genesis.hash })
    );

    // 2. An unknown target, or an unsigned candidate, is refused.
    let unknown = hash(b"unknown");
    assert_eq!(
        service.forward_signature(&unknown, candidate_of(&cluster, &genesis)),
        Err(SkipchainError::UnknownBlock { id: unknown })
    );
    let unsigned = candidate_of(&cluster, &genesis);
    assert_eq!(
        service.forward_signature(&genesis.hash, unsigned.clone()),
        Err(SkipchainError::SignatureInvalid {
            hash: unsigned.calculate_hash()
        })
    );

    // 3. A signed candidate extends a target that has no forward link yet.
    let candidate = service.sign_block(candidate_of(&cluster, &genesis)).unwrap();
    let mut lying = candidate.clone();
    lying.hash = hash(b"not my hash");
    let updated = service.forward_signature(&genesis.hash, lying).unwrap();
    assert_eq!(updated.forward_link[0].hash, candidate.hash);
    assert!(updated.forward_link[0].verify(&genesis.hash, &genesis.roster));
    assert_eq!(service.skip_block(&genesis.hash), Some(updated));

    // 4. The candidate itself was never stored, so the chain is broken past the target.
    assert_eq!(
        service.get_update_chain(&genesis.hash),
        Err(SkipchainError::MissingForwardLink { hash: candidate.hash })
    );
}

/// An unsigned block whose level-0 back link is `predecessor`.
fn candidate_of(cluster: &Cluster, predecessor: &SkipBlock) -> SkipBlock {
    let mut candidate = block(cluster, b"candidate");
    candidate.index = BlockIndex::new(predecessor.index.int() + 1);
    candidate.height = 1;
    candidate.back_link = vec![predecessor.hash];
    candidate
}

#[test]
fn forward_signature_on_linked_target_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(4);
    let service = cluster.leader().service();
    let genesis = propose(&cluster, None, b"");

    // 1. Sign a candidate while the genesis block can still be extended.
    let candidate = service.sign_block(candidate_of(&cluster, &genesis)).unwrap();

    // 2. Once another block has extended it, the candidate cannot be linked anymore.
    let b1 = propose(&cluster, Some(&genesis), b"B1");
    assert_eq!(
        service.forward_signature(&genesis.hash, candidate.clone()),
        Err(SkipchainError::NoValidUpdatePath { target: genesis.hash })
    );

    // 3. The block that did extend it can have its link refreshed.
    let refreshed = service.forward_signature(&genesis.hash, b1.clone()).unwrap();
    assert_eq!(refreshed.forward_link[0].hash, b1.hash);
    assert!(refreshed.forward_link[0].verify(&genesis.hash, &genesis.roster));
    assert!(service.verify_linked_skip_block(&refreshed, &b1));
    assert!(!service.verify_linked_skip_block(&refreshed, &candidate));

    // 4. Signing is refused for blocks extending a block that has already been extended.
    assert_eq!(
        service.sign_block(candidate_of(&cluster, &genesis)),
        Err(SkipchainError::Refused { verifier: VERIFY_NONE })
    );
}

#[test]
fn sign_block_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(3);
    let service = cluster.leader().service();
    let genesis = propose(&cluster, None, b"");

    // 1. The predecessor has to be known.
    let mut orphan = block(&cluster, b"orphan");
    orphan.back_link = vec![hash(b"unknown")];
    assert_eq!(
        service.sign_block(orphan),
        Err(SkipchainError::PredecessorNotFound { id: hash(b"unknown") })
    );

    // 2. A signed block carries its recomputed hash, and is not stored.
    let mut candidate = candidate_of(&cluster, &genesis);
    candidate.hash = hash(b"made up");
    let signed = service.sign_block(candidate).unwrap();
    assert_eq!(signed.hash, signed.calculate_hash());
    assert!(signed.verify_signature());
    assert_eq!(service.skip_block(&signed.hash), None);
    assert!(service.skip_block(&genesis.hash).unwrap().forward_link.is_empty());
}

#[test]
fn set_children_skip_block_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(4);
    let service = cluster.leader().service();
    let parent = propose(&cluster, None, b"parent chain");
    let child = propose(&cluster, None, b"child chain");

    // 1. Unknown blocks are refused.
    let unknown = hash(b"unknown");
    assert_eq!(
        service.set_children_skip_block(&unknown, &child.hash).unwrap_err(),
        SkipchainError::ParentNotFound { id: unknown }
    );
    assert_eq!(
        service.set_children_skip_block(&parent.hash, &unknown).unwrap_err(),
        SkipchainError::ChildNotFound { id: unknown }
    );

    // 2. The child becomes the head of a child chain of the parent.
    let reply = service.set_children_skip_block(&parent.hash, &child.hash).unwrap();
    assert_eq!(reply.parent.child_skip_list.as_ref().unwrap().hash, child.hash);
    assert_eq!(reply.child.parent_block, Some(parent.hash));

    // 3. Identities and seals are unaffected.
    assert_eq!(reply.parent.hash, parent.hash);
    assert_eq!(reply.child.hash, child.hash);
    assert!(reply.child.verify_signature());

    // 4. Every server learns about the new linkage.
    cluster.poll_all();
    for node in &cluster.nodes {
        assert_eq!(node.service().skip_block(&parent.hash), Some(reply.parent.clone()));
        assert_eq!(node.service().skip_block(&child.hash), Some(reply.child.clone()));
    }
}

#[test]
fn propagation_failure_keeps_block_locally_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(4);
    let leader = cluster.leader();
    let genesis = propose(&cluster, None, b"");

    // 1. The third server in the roster becomes unreachable.
    let lagging = &cluster.nodes[2];
    cluster.partition.disconnect(lagging.address());
    let result = leader
        .service()
        .propose_skip_block(Some(genesis.hash), block(&cluster, b"B1"));
    assert_eq!(
        result.unwrap_err(),
        SkipchainError::Propagation(NetworkError::Disconnected(lagging.address()))
    );

    // 2. The proposer stored the block and linked it; servers after the failure never heard of it.
    assert_eq!(leader.service().len(), 2);
    let update = leader.service().get_update_chain(&genesis.hash).unwrap();
    assert_eq!(update.len(), 2);
    let b1 = update[1].clone();
    cluster.poll_all();
    assert_eq!(lagging.service().skip_block(&b1.hash), None);
    assert_eq!(cluster.nodes[3].service().skip_block(&b1.hash), None);
    assert_eq!(cluster.nodes[3].service().get_update_chain(&genesis.hash).unwrap().len(), 1);

    // 3. A server before the failure got both the linked predecessor and the new block, so it can
    // follow the chain up to the new block.
    let second = &cluster.nodes[1];
    assert_eq!(second.service().skip_block(&b1.hash), Some(b1.clone()));
    let hashes: Vec<SkipBlockID> = second
        .service()
        .get_update_chain(&genesis.hash)
        .unwrap()
        .iter()
        .map(|b| b.hash)
        .collect();
    assert_eq!(hashes, vec![genesis.hash, b1.hash]);

    // 4. Once reconnected, a lagging server catches up through the update chain.
    cluster.partition.reconnect(&lagging.address());
    let Reply::UpdateChain(reply) = leader
        .service()
        .handle_request(Request::GetUpdateChain(GetUpdateChain {
            latest_known: genesis.hash,
        }))
        .unwrap()
    else {
        panic!("unexpected reply");
    };
    for block in reply.update {
        lagging.service().propagate_skip_block(leader.address(), block);
    }
    let hashes: Vec<SkipBlockID> = lagging
        .service()
        .get_update_chain(&genesis.hash)
        .unwrap()
        .iter()
        .map(|b| b.hash)
        .collect();
    assert_eq!(hashes, vec![genesis.hash, b1.hash]);
}

#[test]
fn failed_propagation_does_not_undo_local_links_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(4);
    let leader = cluster.leader();

    // 1. The genesis block is created, and the leader's inbox is left alone.
    let genesis = leader
        .service()
        .propose_skip_block(None, block(&cluster, b""))
        .unwrap()
        .latest;

    // 2. Extending it fails to reach one server.
    let lagging = &cluster.nodes[2];
    cluster.partition.disconnect(lagging.address());
    assert!(matches!(
        leader
            .service()
            .propose_skip_block(Some(genesis.hash), block(&cluster, b"B1")),
        Err(SkipchainError::Propagation(_))
    ));
    cluster.partition.reconnect(&lagging.address());

    // 3. Polling the leader leaves its chain as it was: the genesis block still links to B1.
    assert!(leader.poll().is_empty());
    let update = leader.service().get_update_chain(&genesis.hash).unwrap();
    assert_eq!(update.len(), 2);
    assert_eq!(update[0].next().map(|link| link.hash), Some(update[1].hash));

    // 4. So the genesis block cannot be extended a second time.
    assert_eq!(
        leader
            .service()
            .propose_skip_block(Some(genesis.hash), block(&cluster, b"fork"))
            .unwrap_err(),
        SkipchainError::VerificationFailed { verifier: VERIFY_NONE }
    );
    cluster.poll_all();
}

#[test]
fn forward_signature_needs_the_target_roster_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(3);
    let service = cluster.leader().service();
    let genesis = propose(&cluster, None, b"");

    // 1. A candidate sealed by a roster of its own choosing, correctly so.
    let (outsider_keys, outsiders) = servers(3);
    let outsider_cosi = local_cosi(&outsider_keys, CosiConfiguration::default());
    let mut candidate = SkipBlock::new(outsiders.clone(), Data::new(b"takeover".to_vec()));
    candidate.index = BlockIndex::new(2);
    candidate.height = 1;
    candidate.back_link = vec![genesis.hash];
    candidate.hash = candidate.calculate_hash();
    candidate.signature = Some(outsider_cosi.sign(&outsiders, &candidate.hash.bytes()).unwrap());
    assert!(candidate.verify_signature());

    // 2. It is refused, because the target's roster did not seal it.
    assert_eq!(
        service.forward_signature(&genesis.hash, candidate.clone()),
        Err(SkipchainError::SignatureInvalid { hash: candidate.hash })
    );
    assert!(service.skip_block(&genesis.hash).unwrap().forward_link.is_empty());
}

#[test]
fn last_index_cannot_be_extended_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(2);
    let service = cluster.leader().service();
    let genesis = propose(&cluster, None, b"");

    // 1. A block at the last possible index arrives through propagation.
    let mut last = genesis.clone();
    last.index = BlockIndex::new(u64::MAX);
    last.hash = last.calculate_hash();
    service.propagate_skip_block(cluster.nodes[1].address(), last.clone());

    // 2. Extending it fails, and nothing is stored.
    assert_eq!(
        service
            .propose_skip_block(Some(last.hash), block(&cluster, b"beyond"))
            .unwrap_err(),
        SkipchainError::IndexOverflow { id: last.hash }
    );
    assert_eq!(service.len(), 2);
    assert!(service.skip_block(&last.hash).unwrap().forward_link.is_empty());
}

#[test]
fn requests_over_the_network_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(3);
    let genesis = propose(&cluster, None, b"");
    let b1 = propose(&cluster, Some(&genesis), b"B1");
    let mut client = cluster.client.clone();

    // 1. A client asks the second server for the chain.
    let server = &cluster.nodes[1];
    client
        .send(
            server.address(),
            Request::GetUpdateChain(GetUpdateChain {
                latest_known: genesis.hash,
            })
            .into(),
        )
        .unwrap();
    assert!(server.poll().is_empty());

    // 2. The answer comes back over the network.
    match client.recv() {
        Some((origin, Message::Reply(Reply::UpdateChain(reply)))) => {
            assert_eq!(origin, server.address());
            assert_eq!(reply.update, vec![server.service().skip_block(&genesis.hash).unwrap(), b1]);
        }
        _ => panic!("expected an update chain reply"),
    }

    // 3. A failing request is not answered.
    client
        .send(
            server.address(),
            Request::GetUpdateChain(GetUpdateChain {
                latest_known: hash(b"unknown"),
            })
            .into(),
        )
        .unwrap();
    server.poll();
    assert!(client.recv().is_none());
}

#[test]
fn verifier_registry_test() {
    setup_logger(LevelFilter::Trace);
    let cluster = Cluster::new(2);
    let genesis = propose(&cluster, None, b"");
    let b1 = propose(&cluster, Some(&genesis), b"B1");
    let extended = cluster.leader().service().skip_block(&genesis.hash).unwrap();

    // 1. The default registry knows only the baseline policy.
    let registry = VerifierRegistry::default();
    assert!(registry.contains(VERIFY_NONE));
    assert!(registry.verify(VERIFY_NONE, &b1, &genesis));
    assert!(!registry.verify(VERIFY_NONE, &extended, &b1));
    assert!(verify_none(&b1, &genesis));

    // 2. Unknown policies reject.
    let mystery = VerifierID::new(42);
    assert!(!registry.contains(mystery));
    assert!(!registry.verify(mystery, &b1, &genesis));
    assert!(!VerifierRegistry::empty().verify(VERIFY_NONE, &b1, &genesis));
}

#[test]
fn custom_verifier_governs_its_chain_test() {
    setup_logger(LevelFilter::Trace);
    let (keys, roster) = servers(2);
    let cosi = Arc::new(local_cosi(&keys, CosiConfiguration::default()));
    let (mut networks, _) = mock_network(keys.iter().map(|keys| keys.signing_key.verifying_key()));
    let non_empty = VerifierID::new(7);
    let mystery = VerifierID::new(42);

    // 1. A service that knows a policy requiring non-empty payloads.
    let mut registry = VerifierRegistry::default();
    let replaced = registry.register(non_empty, |_: &SkipBlock, proposed: &SkipBlock| !proposed.data.is_empty());
    assert!(replaced.is_none());
    let config = Configuration::builder()
        .me(SigningKey::generate(&mut OsRng))
        .build();
    let service = SkipchainService::new(config, networks.remove(0), cosi).with_verifiers(registry);

    // 2. Chains governed by it, or by a policy nobody knows, arrive through propagation.
    let mut governed = SkipBlock::new(roster.clone(), Data::new(b"head".to_vec()));
    governed.verifier_id = non_empty;
    governed.back_link = vec![hash(b"filler")];
    governed.hash = governed.calculate_hash();
    service.propagate_skip_block(keys[1].signing_key.verifying_key(), governed.clone());

    let mut unknown = governed.clone();
    unknown.verifier_id = mystery;
    unknown.hash = unknown.calculate_hash();
    service.propagate_skip_block(keys[1].signing_key.verifying_key(), unknown.clone());

    // 3. The chain's own policy decides.
    assert_eq!(
        service
            .propose_skip_block(Some(governed.hash), SkipBlock::new(roster.clone(), Data::new(Vec::new())))
            .unwrap_err(),
        SkipchainError::VerificationFailed { verifier: non_empty }
    );
    let reply = service
        .propose_skip_block(Some(governed.hash), SkipBlock::new(roster.clone(), Data::new(b"x".to_vec())))
        .unwrap();
    assert_eq!(reply.latest.verifier_id, non_empty);

    assert_eq!(
        service
            .propose_skip_block(Some(unknown.hash), SkipBlock::new(roster, Data::new(b"x".to_vec())))
            .unwrap_err(),
        SkipchainError::VerificationFailed { verifier: mystery }
    );
}

#[test]
fn signing_failure_stores_nothing_test() {
    setup_logger(LevelFilter::Trace);
    let config = CosiConfiguration::builder().max_signing_attempts(1).build();
    let cluster = Cluster::with_cosi_config(3, config);
    let genesis = propose(&cluster, None, b"");

    cluster
        .cosi
        .node(&cluster.nodes[2].public())
        .unwrap()
        .set_behaviour(Behaviour::SilentOnChallenge);
    let result = cluster
        .leader()
        .service()
        .propose_skip_block(Some(genesis.hash), block(&cluster, b"B1"));
    assert!(matches!(result, Err(SkipchainError::Signing(_))));
    assert_eq!(cluster.leader().service().len(), 1);
    assert!(cluster
        .leader()
        .service()
        .skip_block(&genesis.hash)
        .unwrap()
        .forward_link
        .is_empty());
}
