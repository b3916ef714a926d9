//! Client-side mirror of the server simulation

use log::{debug, warn};
use shared::{
    ClientPacket, Ecs, EcsBuilder, EntityId, EntityUpdate, EntityUpdateKind, InputChannel,
    InputFrame, PacketCounter, ServerPacket, SyncResult, Time,
};
use std::collections::VecDeque;

/// Mirror registry plus the client's side of the input protocol.
///
/// Each frame [`ClientEcs::tick`] captures the local input delta, records it
/// for every predicted component and simulates them ahead of the server.
/// Server packets are applied in [`ClientEcs::on_server_packet`], which also
/// hands back the input packets queued since the previous server packet.
pub struct ClientEcs {
    ecs: Ecs,
    client_id: String,
    time: Time,
    /// Estimate of the server clock, advanced on every packet
    server_time: Option<Time>,
    outgoing: PacketCounter,
    outbox: Vec<ClientPacket>,
    /// Send times of packets not yet acknowledged
    in_flight: VecDeque<(u32, f64)>,
    last_ack: u32,
    round_trip: Option<f64>,
}

impl ClientEcs {
    /// Builds the mirror registry for `client_id`, starting the local clock at `now`
    pub fn new(builder: EcsBuilder, client_id: impl Into<String>, now: f64) -> Self {
        let client_id = client_id.into();
        let mut ecs = builder.build_mirror(client_id.clone());
        ecs.create_input_channel(&client_id);
        let time = Time::with_interval(now, ecs.config().initial_tick_interval);

        Self {
            ecs,
            client_id,
            time,
            server_time: None,
            outgoing: PacketCounter::new(),
            outbox: Vec::new(),
            in_flight: VecDeque::new(),
            last_ack: 0,
            round_trip: None,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
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

    pub fn server_time(&self) -> Option<&Time> {
        self.server_time.as_ref()
    }

    /// Live input channel of the local player
    pub fn input_mut(&mut self) -> &mut InputChannel {
        self.ecs.ensure_input_channel(&self.client_id)
    }

    /// Index of the last input packet the server applied
    pub fn last_ack(&self) -> u32 {
        self.last_ack
    }

    /// Input packets waiting for the next server packet
    pub fn pending_outgoing(&self) -> usize {
        self.outbox.len()
    }

    /// Latest measured time between sending an input and its acknowledgement
    pub fn round_trip(&self) -> Option<f64> {
        self.round_trip
    }

    /// Entities controlled by this client
    pub fn local_entities(&self) -> Vec<EntityId> {
        self.ecs
            .entity_ids()
            .into_iter()
            .filter(|id| {
                self.ecs
                    .entity(id)
                    .is_some_and(|entity| entity.owner() == Some(self.client_id.as_str()))
            })
            .collect()
    }

    /// Runs one local frame at wall-clock time `now`.
    ///
    /// Every frame goes out as its own input packet, with or without a
    /// delta. The frame is recorded under the index of the last packet sent
    /// before it, so a server acknowledging index `n` has simulated every
    /// record below `n`.
    pub fn tick(&mut self, now: f64) -> SyncResult<()> {
        self.time = self.time.advanced(now);
        self.ecs.advance_interpolation(self.time.dt())?;

        let channel = self.ecs.ensure_input_channel(&self.client_id);
        let delta = channel.report();
        let held = channel.pressed_keys().clone();

        let index = self.outgoing.current();
        let ix = self.outgoing.next();
        self.outbox.push(ClientPacket {
            ix,
            input: (!delta.is_empty()).then(|| delta.clone()),
        });

        self.ecs
            .record_input(&self.time, index, &InputFrame { delta, held });
        self.ecs.run_update(&self.time);
        Ok(())
    }

    /// Hands out the queued input packets, stamped as sent at `now`
    pub fn take_outgoing(&mut self, now: f64) -> Vec<ClientPacket> {
        let outgoing = std::mem::take(&mut self.outbox);
        self.in_flight
            .extend(outgoing.iter().map(|packet| (packet.ix, now)));
        outgoing
    }

    /// Applies a server packet received at `now` and returns the input
    /// packets to send back.
    ///
    /// Contract violations abort the packet and are returned. Lookup
    /// failures only skip the offending component.
    pub fn on_server_packet(
        &mut self,
        packet: &ServerPacket,
        now: f64,
    ) -> SyncResult<Vec<ClientPacket>> {
        let server_time = match self.server_time {
            Some(time) => time.advanced(now),
            None => Time::with_interval(now, self.ecs.config().initial_tick_interval),
        };
        self.server_time = Some(server_time);

        if packet.ix > self.last_ack {
            self.last_ack = packet.ix;
        }
        while let Some(&(ix, sent_at)) = self.in_flight.front() {
            if ix > packet.ix {
                break;
            }
            self.round_trip = Some(now - sent_at);
            self.in_flight.pop_front();
        }

        for update in &packet.entities {
            match update.kind {
                EntityUpdateKind::Update => self.apply_update(update, packet.ix, &server_time)?,
                EntityUpdateKind::Destroyed => {
                    if self.ecs.destroy_entity(&update.id).is_none() {
                        debug!("Destroy for unknown entity '{}'", update.id);
                    }
                }
            }
        }

        Ok(self.take_outgoing(now))
    }

    fn apply_update(
        &mut self,
        update: &EntityUpdate,
        acked_index: u32,
        server_time: &Time,
    ) -> SyncResult<()> {
        if !self.ecs.contains(&update.id) {
            self.ecs.spawn(Some(&update.id), update.owner.as_deref());
        }

        let Some(components) = &update.components else {
            return Ok(());
        };

        for component in components {
            let row = component.row as usize;
            if row >= self.ecs.row_count() {
                warn!(
                    "Skipping unknown component row {} on entity '{}'",
                    row, update.id
                );
                continue;
            }

            let missing = self
                .ecs
                .entity(&update.id)
                .is_some_and(|entity| !entity.has_row(row));
            if missing {
                self.ecs.add_component_at(&update.id, row)?;
            }

            match self.ecs.apply_authoritative_state(
                &update.id,
                row,
                &component.state,
                acked_index,
                server_time,
            ) {
                Ok(()) => {}
                Err(e) if e.is_lookup_failure() => {
                    warn!("Skipping state for '{}' row {}: {}", update.id, row, e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
