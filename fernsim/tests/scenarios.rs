//! End-to-end transport scenarios over simulated meshes.

use fernlink::types::{MSG_ID_REQUEST, MSG_ID_RESPONSE};
use fernlink::{
    Command, Duration, Frame, NodeOptions, State, BROADCAST_ADDRESS, GATEWAY_ADDRESS,
};
use fernsim::{Simulator, Topology};

const STEP: Duration = Duration::from_millis(100);

/// Cold boot with a dynamic id in a two-hop topology. The node only hears
/// the repeater; the repeater advertises distance 1; the gateway's
/// controller (played by the test) assigns id 2.
#[test]
fn cold_boot_dynamic_id_two_hop() {
    let mut sim = Simulator::new(Topology::chain(&[0, 1, 2]));
    let gw = sim.add_node(NodeOptions::new().gateway());
    let repeater = sim.add_node(NodeOptions::new().with_node_id(1).repeater());
    let node = sim.add_node(NodeOptions::new());
    sim.boot_all();

    for _ in 0..400 {
        sim.tick(STEP);
        // Play controller: answer id requests surfacing at the gateway. The
        // response is a broadcast - the requester has no address yet.
        loop {
            let Ok(frame) = sim.node(gw).incoming().try_receive() else {
                break;
            };
            if frame.is_internal(MSG_ID_REQUEST) {
                let mut response =
                    Frame::internal(GATEWAY_ADDRESS, BROADCAST_ADDRESS, MSG_ID_RESPONSE, 2);
                assert!(sim.node_mut(gw).send_route(&mut response));
            }
        }
        if sim.node(node).is_ready() {
            break;
        }
    }

    assert!(sim.node(repeater).is_ready());
    assert!(sim.node(node).is_ready());
    assert_eq!(sim.node(node).node_id(), 2);
    assert_eq!(sim.node(node).parent_node_id(), 1);
    assert_eq!(sim.node(node).distance(), 2);
    // The verification pong traveled two hops.
    assert_eq!(sim.node(node).ping_response(), 2);
    // The repeater holds a downlink route to the new node.
    assert_eq!(sim.node(repeater).storage().routes[1], 2);
}

/// Static parent and static id: every join state short-circuits and the
/// node is Ready within the 2 s state timeout.
#[test]
fn static_parent_static_id_ready_within_two_seconds() {
    let mut sim = Simulator::new(Topology::chain(&[0, 1, 2]));
    let gw = sim.add_node(NodeOptions::new().gateway());
    let repeater = sim.add_node(NodeOptions::new().with_node_id(3).with_parent(0).repeater());
    let node = sim.add_node(NodeOptions::new().with_node_id(7).with_parent(3));
    sim.boot_all();

    sim.run_for(Duration::from_secs(2), STEP);

    assert!(sim.node(gw).is_ready());
    assert!(sim.node(repeater).is_ready());
    assert!(sim.node(node).is_ready());
    assert_eq!(sim.node(node).node_id(), 7);
    assert_eq!(sim.node(node).parent_node_id(), 3);
    // The static distance of 1 was corrected by the verification pong.
    assert_eq!(sim.node(node).distance(), 2);
}

/// The parent disappears in Ready: sends fail until the threshold trips,
/// the node re-elects, and comes back Ready under the surviving repeater
/// with a clean failure counter.
#[test]
fn parent_loss_reparents_through_second_repeater() {
    let mut topology = Topology::new();
    topology.add_link(0, 1); // gw - repeater 1
    topology.add_link(0, 2); // gw - repeater 4
    topology.add_link(3, 1); // node - repeater 1
    topology.add_link(3, 2); // node - repeater 4
    let mut sim = Simulator::new(topology);
    let _gw = sim.add_node(NodeOptions::new().gateway());
    let _rep1 = sim.add_node(NodeOptions::new().with_node_id(1).with_parent(0).repeater());
    let _rep4 = sim.add_node(NodeOptions::new().with_node_id(4).with_parent(0).repeater());
    let node = sim.add_node(NodeOptions::new().with_node_id(9));
    sim.boot_all();

    sim.run_for(Duration::from_secs(10), STEP);
    assert!(sim.node(node).is_ready());
    assert_eq!(sim.node(node).parent_node_id(), 1);

    // Repeater 1 falls off the air for this node.
    sim.set_link_active(3, 1, false);
    let mut attempts = 0u8;
    while !sim.node(node).is_searching_parent() && attempts < 50 {
        let mut frame = Frame::new(9, GATEWAY_ADDRESS, 1, Command::Set, 0, &[attempts]);
        sim.node_mut(node).send_route(&mut frame);
        sim.tick(STEP);
        attempts += 1;
    }
    assert!(sim.node(node).is_searching_parent());

    sim.run_for(Duration::from_secs(10), STEP);
    assert!(sim.node(node).is_ready());
    assert_eq!(sim.node(node).parent_node_id(), 4);
    assert_eq!(sim.node(node).failed_uplink_transmissions(), 0);

    // Traffic flows again through the new parent.
    let mut frame = Frame::new(9, GATEWAY_ADDRESS, 1, Command::Set, 0, &[99]);
    assert!(sim.node_mut(node).send_route(&mut frame));
}

/// A hardware fault detected by the sanity check powers the transport down
/// and the node rejoins from scratch after the recovery delay.
#[test]
fn radio_fault_recovers_through_failure_state() {
    let mut sim = Simulator::new(Topology::fully_connected(2));
    let _gw = sim.add_node(NodeOptions::new().gateway());
    let node = sim.add_node(NodeOptions::new().with_node_id(5));
    sim.boot_all();

    sim.run_for(Duration::from_secs(5), STEP);
    assert!(sim.node(node).is_ready());

    sim.set_sane(1, false);
    sim.run_for(Duration::from_secs(16), STEP);
    assert_eq!(sim.node(node).state(), State::Failure);
    assert!(!sim.node(node).is_ready());

    sim.set_sane(1, true);
    sim.run_for(Duration::from_secs(15), STEP);
    assert!(sim.node(node).is_ready());

    use fernlink::debug::DebugEvent;
    let events = sim.events(1);
    assert!(events.contains(&DebugEvent::SanityCheckFailed));
    assert!(events.contains(&DebugEvent::PowerDown));
    assert!(events.contains(&DebugEvent::ReInit));
}

/// Application frames travel leaf -> gateway and, thanks to back-route
/// learning at both the repeater and the gateway, gateway -> leaf.
#[test]
fn app_traffic_flows_both_ways_across_a_repeater() {
    let mut sim = Simulator::new(Topology::chain(&[0, 1, 2]));
    let gw = sim.add_node(NodeOptions::new().gateway());
    let repeater = sim.add_node(NodeOptions::new().with_node_id(3).with_parent(0).repeater());
    let node = sim.add_node(NodeOptions::new().with_node_id(7).with_parent(3));
    sim.boot_all();
    sim.run_for(Duration::from_secs(3), STEP);
    assert!(sim.node(node).is_ready());

    // Uplink: leaf to gateway.
    let mut uplink = Frame::new(7, GATEWAY_ADDRESS, 4, Command::Set, 0, &[42]);
    assert!(sim.node_mut(node).send_route(&mut uplink));
    sim.run_for(Duration::from_secs(1), STEP);
    let received = sim.node(gw).incoming().try_receive().unwrap();
    assert_eq!(received.sender, 7);
    assert_eq!(received.payload, &[42]);
    // The gateway heard it from the repeater, not the leaf.
    assert_eq!(received.last_hop, 3);

    // Downlink: gateway to leaf, over the learned routes.
    let mut downlink = Frame::new(GATEWAY_ADDRESS, 7, 4, Command::Req, 0, &[1]);
    assert!(sim.node_mut(gw).send_route(&mut downlink));
    sim.run_for(Duration::from_secs(1), STEP);
    let received = sim.node(node).incoming().try_receive().unwrap();
    assert_eq!(received.sender, GATEWAY_ADDRESS);
    assert_eq!(received.last_hop, 3);

    // Broadcasts reach the leaf through the repeater's one re-broadcast.
    let mut bc = Frame::new(GATEWAY_ADDRESS, BROADCAST_ADDRESS, 4, Command::Set, 0, &[9]);
    assert!(sim.node_mut(gw).send_route(&mut bc));
    sim.run_for(Duration::from_secs(1), STEP);
    let received = sim.node(node).incoming().try_receive().unwrap();
    assert_eq!(received.destination, BROADCAST_ADDRESS);
    assert_eq!(received.payload, &[9]);
}

/// A node that only ever hears silence walks Init -> FindParent ->
/// (retries) -> Failure, then keeps cycling through recovery attempts.
#[test]
fn isolated_node_cycles_through_failure() {
    let mut sim = Simulator::new(Topology::new()); // no links at all
    let node = sim.add_node(NodeOptions::new());
    sim.boot_all();
    assert_eq!(sim.node(node).state(), State::FindParent);

    // Four election windows (initial + three retries), then Failure.
    sim.run_for(Duration::from_secs(9), STEP);
    assert_eq!(sim.node(node).state(), State::Failure);

    // After the recovery delay it tries again.
    sim.run_for(Duration::from_secs(11), STEP);
    assert_eq!(sim.node(node).state(), State::FindParent);
}
