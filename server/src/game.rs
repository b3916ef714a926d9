//! Authoritative synchronization layer: tick loop, client inputs and packets

use log::{debug, info, warn};
use shared::state::compress_state;
use shared::{
    ClientPacket, Ecs, EntityId, EntitySnapshot, EntityUpdate, Mover, ServerPacket, SyncResult,
    Time, MOVER_SIZE, WORLD_HEIGHT, WORLD_WIDTH,
};
use std::collections::BTreeMap;

/// Decides which entities a client receives
pub trait RelevancePolicy {
    fn is_relevant(&self, client_id: &str, entity: &EntitySnapshot) -> bool;
}

/// Sends every entity to every client
#[derive(Debug, Clone, Copy, Default)]
pub struct Everything;

impl RelevancePolicy for Everything {
    fn is_relevant(&self, _client_id: &str, _entity: &EntitySnapshot) -> bool {
        true
    }
}

/// Game hook for clients joining and leaving
pub trait SessionHandler {
    fn on_connect(&mut self, game: &mut ServerEcs, client_id: &str) -> SyncResult<()>;
    fn on_disconnect(&mut self, game: &mut ServerEcs, client_id: &str);
}

/// Authoritative registry plus per-client acknowledgement state
pub struct ServerEcs {
    ecs: Ecs,
    time: Time,
    /// Entities destroyed since the last flush
    destroyed: Vec<EntityId>,
    /// Last applied client packet index, per connected client
    acks: BTreeMap<String, u32>,
    relevance: Box<dyn RelevancePolicy>,
    tick: u64,
}

impl ServerEcs {
    pub fn new(ecs: Ecs, now: f64) -> Self {
        let time = Time::with_interval(now, ecs.config().initial_tick_interval);
        Self {
            ecs,
            time,
            destroyed: Vec::new(),
            acks: BTreeMap::new(),
            relevance: Box::new(Everything),
            tick: 0,
        }
    }

    pub fn with_relevance(mut self, relevance: impl RelevancePolicy + 'static) -> Self {
        self.relevance = Box::new(relevance);
        self
    }

    pub fn ecs(&self) -> &Ecs {
        &self.ecs
    }

    pub fn ecs_mut(&mut self) -> &mut Ecs {
        &mut self.ecs
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn client_count(&self) -> usize {
        self.acks.len()
    }

    pub fn last_acked(&self, client_id: &str) -> Option<u32> {
        self.acks.get(client_id).copied()
    }

    /// Creates the client's input channel and acknowledgement record
    pub fn connect_client(&mut self, client_id: &str) {
        if self.acks.contains_key(client_id) {
            warn!("Client {} is already connected", client_id);
            return;
        }
        self.ecs.create_input_channel(client_id);
        self.acks.insert(client_id.to_string(), 0);
        info!("Client {} joined the simulation", client_id);
    }

    pub fn disconnect_client(&mut self, client_id: &str) -> bool {
        if self.acks.remove(client_id).is_none() {
            return false;
        }
        self.ecs.remove_input_channel(client_id);
        info!("Client {} left the simulation", client_id);
        true
    }

    /// Entities whose owner is `client_id`
    pub fn entities_owned_by(&self, client_id: &str) -> Vec<EntityId> {
        self.ecs
            .entity_ids()
            .into_iter()
            .filter(|id| {
                self.ecs
                    .entity(id)
                    .is_some_and(|entity| entity.owner() == Some(client_id))
            })
            .collect()
    }

    /// Destroys an entity and queues its id for the next packets
    pub fn destroy_entity(&mut self, id: &str) -> bool {
        if self.ecs.destroy_entity(id).is_none() {
            return false;
        }
        self.destroyed.push(id.to_string());
        true
    }

    /// Advances time, then starts new components and updates all of them
    pub fn tick(&mut self, now: f64) {
        self.time = self.time.advanced(now);
        self.ecs.run_start(&self.time);
        self.ecs.run_update(&self.time);
        self.tick += 1;
    }

    /// Applies an input packet. Returns false when the packet was dropped.
    pub fn on_client_packet(&mut self, client_id: &str, packet: &ClientPacket) -> bool {
        let Some(last_acked) = self.acks.get(client_id).copied() else {
            warn!("Dropping packet {} from unknown client {}", packet.ix, client_id);
            return false;
        };

        if packet.ix <= last_acked {
            debug!(
                "Dropping stale packet {} from client {} (last acked {})",
                packet.ix, client_id, last_acked
            );
            return false;
        }

        if let Some(delta) = &packet.input {
            match self.ecs.input_channel_mut(client_id) {
                Some(channel) => channel.apply_delta(delta),
                None => warn!("Client {} has no input channel", client_id),
            }
        }

        self.acks.insert(client_id.to_string(), packet.ix);
        true
    }

    /// Builds one packet per connected client and clears the destroyed list.
    ///
    /// Every packet carries the states of the entities relevant to that
    /// client, precision-reduced, followed by the entities destroyed since
    /// the previous flush.
    pub fn build_packets(&mut self) -> SyncResult<Vec<(String, ServerPacket)>> {
        let digits = self.ecs.config().precision_digits;
        let mut snapshots = self.ecs.collect_states()?;
        for snapshot in &mut snapshots {
            for (_, state) in &mut snapshot.components {
                compress_state(state, digits);
            }
        }

        let mut destroyed: Vec<EntityId> = Vec::new();
        for id in self.destroyed.drain(..) {
            if !self.ecs.contains(&id) && !destroyed.contains(&id) {
                destroyed.push(id);
            }
        }

        let packets = self
            .acks
            .iter()
            .map(|(client_id, ack)| {
                let mut entities: Vec<EntityUpdate> = snapshots
                    .iter()
                    .filter(|snapshot| self.relevance.is_relevant(client_id, snapshot))
                    .cloned()
                    .map(EntityUpdate::from)
                    .collect();
                entities.extend(destroyed.iter().map(EntityUpdate::destroyed));

                (
                    client_id.clone(),
                    ServerPacket {
                        ix: *ack,
                        entities,
                    },
                )
            })
            .collect();

        Ok(packets)
    }
}

/// Gives every joining client a [`Mover`] and removes it when they leave
#[derive(Debug, Default)]
pub struct MoverSpawner {
    joined: u32,
}

impl MoverSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn_point(&self) -> (f64, f64) {
        let lane = WORLD_WIDTH - 200.0;
        let x = 100.0 + (self.joined as f64 * 60.0) % lane;
        let y = WORLD_HEIGHT / 2.0 - MOVER_SIZE / 2.0;
        (x, y)
    }
}

impl SessionHandler for MoverSpawner {
    fn on_connect(&mut self, game: &mut ServerEcs, client_id: &str) -> SyncResult<()> {
        game.connect_client(client_id);

        let (x, y) = self.spawn_point();
        self.joined += 1;

        let ecs = game.ecs_mut();
        let id = ecs.spawn(None, Some(client_id));
        ecs.insert_component(&id, Mover::at(x, y))?;

        info!("Spawned mover {} for client {} at ({}, {})", id, client_id, x, y);
        Ok(())
    }

    fn on_disconnect(&mut self, game: &mut ServerEcs, client_id: &str) {
        for id in game.entities_owned_by(client_id) {
            game.destroy_entity(&id);
        }
        game.disconnect_client(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::input::{KEY_LEFT, KEY_RIGHT};
    use shared::{demo_builder, EntityUpdateKind, InputDelta, SyncConfig, Value};

    fn game() -> ServerEcs {
        ServerEcs::new(demo_builder(SyncConfig::default()).build(), 0.0)
    }

    fn press(ix: u32, code: u32) -> ClientPacket {
        ClientPacket {
            ix,
            input: Some(InputDelta {
                down: vec![code],
                up: vec![],
            }),
        }
    }

    #[test]
    fn test_server_creation() {
        let game = game();
        assert_eq!(game.tick_count(), 0);
        assert_eq!(game.client_count(), 0);
        assert_eq!(game.time().dt(), 0.05);
    }

    #[test]
    fn test_connect_and_disconnect() {
        let mut game = game();
        game.connect_client("c1");
        assert_eq!(game.last_acked("c1"), Some(0));
        assert!(game.ecs().input_channel("c1").is_some());

        assert!(game.disconnect_client("c1"));
        assert!(!game.disconnect_client("c1"));
        assert!(game.ecs().input_channel("c1").is_none());
    }

    #[test]
    fn test_unknown_client_packet_is_dropped() {
        let mut game = game();
        assert!(!game.on_client_packet("ghost", &press(1, KEY_RIGHT)));
    }

    #[test]
    fn test_stale_packets_are_dropped() {
        let mut game = game();
        game.connect_client("c1");

        assert!(game.on_client_packet("c1", &press(3, KEY_RIGHT)));
        assert_eq!(game.last_acked("c1"), Some(3));

        assert!(!game.on_client_packet("c1", &press(3, KEY_LEFT)));
        assert!(!game.on_client_packet("c1", &press(2, KEY_LEFT)));

        let channel = game.ecs().input_channel("c1").unwrap();
        assert!(channel.is_key_pressed(KEY_RIGHT));
        assert!(!channel.is_key_pressed(KEY_LEFT));
    }

    #[test]
    fn test_tick_moves_owned_mover() {
        let mut game = game();
        let mut spawner = MoverSpawner::new();
        spawner.on_connect(&mut game, "c1").unwrap();
        let id = game.entities_owned_by("c1")[0].clone();
        let start_x = game.ecs().get_component::<Mover>(&id).unwrap().x;

        game.on_client_packet("c1", &press(1, KEY_RIGHT));
        game.tick(0.5);

        let mover = game.ecs().get_component::<Mover>(&id).unwrap();
        assert_approx_eq!(mover.x, start_x + 100.0, 1e-9);
        assert_eq!(mover.heading, "right");
        assert_eq!(game.tick_count(), 1);
    }

    #[test]
    fn test_packets_carry_states_and_acks() {
        let mut game = game();
        let mut spawner = MoverSpawner::new();
        spawner.on_connect(&mut game, "c1").unwrap();
        spawner.on_connect(&mut game, "c2").unwrap();
        game.on_client_packet("c2", &press(7, KEY_RIGHT));

        let packets = game.build_packets().unwrap();
        assert_eq!(packets.len(), 2);

        let (client, packet) = &packets[1];
        assert_eq!(client, "c2");
        assert_eq!(packet.ix, 7);
        assert_eq!(packet.entities.len(), 2);
        assert!(packet
            .entities
            .iter()
            .all(|update| update.kind == EntityUpdateKind::Update));
        assert!(packet
            .entities
            .iter()
            .any(|update| update.owner.as_deref() == Some("c2")));
    }

    #[test]
    fn test_numbers_are_compressed() {
        let mut game = game();
        let id = game.ecs_mut().create_entity(Some("e1"));
        game.ecs_mut()
            .insert_component(&id, Mover::at(1.23456789, 2.0))
            .unwrap();
        game.connect_client("c1");

        let packets = game.build_packets().unwrap();
        let components = packets[0].1.entities[0].components.as_ref().unwrap();
        assert_eq!(components[0].row, 0);
        assert_eq!(components[0].state[0], Value::from(1.2346));
        assert_eq!(components[0].state[1], Value::from(2.0));
    }

    #[test]
    fn test_destroyed_entities_are_sent_once() {
        let mut game = game();
        let mut spawner = MoverSpawner::new();
        spawner.on_connect(&mut game, "c1").unwrap();
        spawner.on_connect(&mut game, "c2").unwrap();

        let leaving = game.entities_owned_by("c2")[0].clone();
        spawner.on_disconnect(&mut game, "c2");
        assert!(!game.ecs().contains(&leaving));

        let packets = game.build_packets().unwrap();
        assert_eq!(packets.len(), 1);
        let entities = &packets[0].1.entities;
        let destroyed: Vec<&EntityUpdate> = entities
            .iter()
            .filter(|update| update.kind == EntityUpdateKind::Destroyed)
            .collect();
        assert_eq!(destroyed.len(), 1);
        assert_eq!(destroyed[0].id, leaving);
        assert!(destroyed[0].components.is_none());

        let packets = game.build_packets().unwrap();
        assert!(packets[0]
            .1
            .entities
            .iter()
            .all(|update| update.kind == EntityUpdateKind::Update));
    }

    struct OwnOnly;

    impl RelevancePolicy for OwnOnly {
        fn is_relevant(&self, client_id: &str, entity: &EntitySnapshot) -> bool {
            entity.owner.as_deref() == Some(client_id)
        }
    }

    #[test]
    fn test_relevance_policy_filters_entities() {
        let mut game = game().with_relevance(OwnOnly);
        let mut spawner = MoverSpawner::new();
        spawner.on_connect(&mut game, "c1").unwrap();
        spawner.on_connect(&mut game, "c2").unwrap();

        for (client, packet) in game.build_packets().unwrap() {
            assert_eq!(packet.entities.len(), 1);
            assert_eq!(packet.entities[0].owner.as_deref(), Some(client.as_str()));
        }
    }

    #[test]
    fn test_spawn_points_are_spread() {
        let mut game = game();
        let mut spawner = MoverSpawner::new();
        spawner.on_connect(&mut game, "c1").unwrap();
        spawner.on_connect(&mut game, "c2").unwrap();

        let xs: Vec<f64> = game
            .ecs()
            .components_of::<Mover>()
            .iter()
            .map(|(_, mover)| mover.x)
            .collect();
        assert_eq!(xs, vec![100.0, 160.0]);
    }
}
