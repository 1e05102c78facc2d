use std::time::Duration;
use vanish_dht::{EpochConfig, Error, FoundValue, Kademlia, NodeId, RpcError};

#[tokio::test(flavor = "multi_thread")]
async fn ping_makes_both_nodes_known() {
    init_log();

    let a = start_node(EpochConfig::default()).await;
    let b = start_node(EpochConfig::default()).await;

    let pong = a.ping(b.contact().addr()).await.unwrap();
    assert_eq!(pong, b.contact());

    let b_at_a = a.find_contact(b.node_id()).await.unwrap();
    assert_eq!(b_at_a.host(), b.contact().host());
    assert_eq!(b_at_a.port(), b.contact().port());

    let a_at_b = b.find_contact(a.node_id()).await.unwrap();
    assert_eq!(a_at_b.host(), a.contact().host());
    assert_eq!(a_at_b.port(), a.contact().port());

    assert_eq!(a.state().await.unwrap().node_count, 1);
    assert_eq!(b.state().await.unwrap().node_count, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn store_lands_only_at_target() {
    init_log();

    let a = start_node(EpochConfig::default()).await;
    let b = start_node(EpochConfig::default()).await;

    let key = NodeId::sha1(b"greeting");
    a.store(&b.contact(), key, b"hello".to_vec()).await.unwrap();

    assert_eq!(b.local_find_value(key).unwrap(), b"hello");
    assert!(matches!(a.local_find_value(key), Err(Error::NotFound(_))));

    match a.find_value(&b.contact(), key).await.unwrap() {
        FoundValue::Value(value) => assert_eq!(value, b"hello"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn iterative_find_node_finds_neighbour_of_target() {
    init_log();

    let nodes = start_network(10, EpochConfig::default()).await;
    let wanted = &nodes[7];

    // Node 5 only knows the hub; everything else is learnt during the lookup.
    let target = wanted.node_id().flip_bit(159);
    let found = nodes[5].iterative_find_node(target).await.unwrap();

    assert_eq!(found.first(), Some(&wanted.contact()));
    assert_eq!(found.len(), nodes.len() - 1);
    assert!(!found.contains(&nodes[5].contact()));
}

#[tokio::test(flavor = "multi_thread")]
async fn iterative_store_reaches_closest_node() {
    init_log();

    let nodes = start_network(10, EpochConfig::default()).await;
    let closest = &nodes[3];
    let key = closest.node_id().flip_bit(159);

    let stored_at = nodes[0].iterative_store(key, b"value".to_vec()).await.unwrap();

    assert!(stored_at.contains(&closest.contact()));
    assert_eq!(closest.local_find_value(key).unwrap(), b"value");

    match nodes[4].iterative_find_value(key).await.unwrap() {
        FoundValue::Value(value) => assert_eq!(value, b"value"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn iterative_store_keeps_copy_at_storing_node_when_closest() {
    init_log();

    let nodes = start_network(5, EpochConfig::default()).await;
    let key = nodes[0].node_id().flip_bit(159);

    let stored_at = nodes[0].iterative_store(key, b"value".to_vec()).await.unwrap();

    assert!(!stored_at.is_empty());
    assert_eq!(nodes[0].local_find_value(key).unwrap(), b"value");
}

#[tokio::test(flavor = "multi_thread")]
async fn vanish_then_unvanish() {
    init_log();

    let nodes = start_network(8, EpochConfig::default()).await;

    let vdo = nodes[0]
        .vanish_data(b"this message will self-destruct", 5, 3, Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(vdo.number_keys, 5);
    assert_eq!(vdo.threshold, 3);
    assert!(vdo.access_key >= 0);

    let unvanished = nodes[5].unvanish_data(&vdo, true).await.unwrap();
    assert_eq!(
        unvanished.data.as_deref(),
        Some(&b"this message will self-destruct"[..])
    );

    let key_only = nodes[3].unvanish_data(&vdo, false).await.unwrap();
    assert_eq!(key_only.key, unvanished.key);
    assert_eq!(key_only.data, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn unvanish_registered_vdo_from_another_node() {
    init_log();

    let nodes = start_network(8, EpochConfig::default()).await;
    let vdo_id = NodeId::sha1(b"my vdo");

    let vdo = nodes[0]
        .vanish(vdo_id, b"registered payload", 4, 2, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(nodes[0].local_find_vdo(vdo_id).unwrap(), vdo);

    let data = nodes[6].unvanish(nodes[0].node_id(), vdo_id).await.unwrap();
    assert_eq!(data, b"registered payload");

    let missing = nodes[1]
        .get_vdo(&nodes[0].contact(), NodeId::sha1(b"nope"))
        .await;
    assert!(matches!(
        missing,
        Err(Error::Rpc {
            source: RpcError::Remote(_),
            ..
        })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn monitor_keeps_shares_alive_across_epochs() {
    init_log();

    let config = EpochConfig {
        period: Duration::from_secs(2),
        margin: Duration::from_millis(200),
    };
    let nodes = start_network(6, config).await;

    let vdo = nodes[0]
        .vanish_data(b"still here", 4, 2, Duration::from_secs(30))
        .await
        .unwrap();

    // Long enough for the epoch of the first push to drop out of the search window.
    tokio::time::sleep(Duration::from_secs(5)).await;

    let unvanished = nodes[3].unvanish_data(&vdo, true).await.unwrap();
    assert_eq!(unvanished.data.as_deref(), Some(&b"still here"[..]));
}

#[tokio::test(flavor = "multi_thread")]
async fn vdo_vanishes_without_monitor() {
    init_log();

    let config = EpochConfig {
        period: Duration::from_secs(1),
        margin: Duration::from_millis(100),
    };
    let nodes = start_network(4, config).await;

    let vdo = nodes[0]
        .vanish_data(b"gone soon", 3, 2, Duration::ZERO)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert!(matches!(
        nodes[1].unvanish_data(&vdo, true).await,
        Err(Error::SecretSharing(_))
    ));
}

async fn start_node(epoch_config: EpochConfig) -> Kademlia {
    Kademlia::builder()
        .set_epoch_config(epoch_config)
        .bind("127.0.0.1:0")
        .await
        .unwrap()
}

// Every node joins through the first one, which therefore knows the whole network.
async fn start_network(count: usize, epoch_config: EpochConfig) -> Vec<Kademlia> {
    let mut nodes: Vec<Kademlia> = Vec::with_capacity(count);

    for _ in 0..count {
        let node = start_node(epoch_config).await;

        if let Some(hub) = nodes.first() {
            node.ping(hub.contact().addr()).await.unwrap();
        }

        nodes.push(node);
    }

    nodes
}

fn init_log() {
    let _ = pretty_env_logger::try_init();
}
