//! Entity/component registry shared by the server and client layers

use crate::component::{Component, SyncComponent, Synced, TickContext};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::input::{InputChannel, InputFrame};
use crate::interpolation::Interpolator;
use crate::prediction::PredictionBuffer;
use crate::state::{ComponentState, Value};
use crate::time::Time;
use log::{debug, warn};
use rand::Rng;
use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, HashMap};

pub type EntityId = String;

/// Per-row registration flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowOptions {
    /// Attach an instance of this type to every new entity
    pub is_default: bool,
}

struct ComponentRow {
    name: &'static str,
    type_id: TypeId,
    factory: fn() -> Box<dyn SyncComponent>,
    options: RowOptions,
    /// Owning entities in insertion order
    instances: Vec<EntityId>,
}

fn make_component<C: Component + Default>() -> Box<dyn SyncComponent> {
    Box::new(Synced::new(C::default()))
}

fn short_type_name<C>() -> &'static str {
    short_name(type_name::<C>())
}

/// Last path segment of a type name, generic arguments dropped
fn short_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// How a component instance is driven
pub enum SyncRole {
    /// Simulated locally and authoritative (server side)
    Authoritative,
    /// Owned by this client: simulated ahead and reconciled on correction
    Predicted(PredictionBuffer),
    /// Owned elsewhere: dead-reckoned between snapshots
    Interpolated(Interpolator),
}

impl SyncRole {
    pub fn label(&self) -> &'static str {
        match self {
            SyncRole::Authoritative => "authoritative",
            SyncRole::Predicted(_) => "predicted",
            SyncRole::Interpolated(_) => "interpolated",
        }
    }

    fn simulates(&self) -> bool {
        !matches!(self, SyncRole::Interpolated(_))
    }
}

pub struct ComponentSlot {
    component: Box<dyn SyncComponent>,
    started: bool,
    role: SyncRole,
}

impl ComponentSlot {
    pub fn component(&self) -> &dyn SyncComponent {
        self.component.as_ref()
    }

    pub fn role(&self) -> &SyncRole {
        &self.role
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

pub struct Entity {
    id: EntityId,
    owner: Option<String>,
    components: BTreeMap<usize, ComponentSlot>,
    destroyed: bool,
}

impl Entity {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the client controlling this entity, if any
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.components.keys().copied()
    }

    pub fn has_row(&self, row: usize) -> bool {
        self.components.contains_key(&row)
    }

    pub fn slot(&self, row: usize) -> Option<&ComponentSlot> {
        self.components.get(&row)
    }
}

/// Captured state of one entity, tagged with component rows
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub owner: Option<String>,
    pub components: Vec<(usize, ComponentState)>,
}

enum Mode {
    Authoritative,
    Mirror { local_id: String },
}

/// Registers component types in row order and builds an [`Ecs`]
pub struct EcsBuilder {
    rows: Vec<ComponentRow>,
    config: SyncConfig,
}

impl EcsBuilder {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            rows: Vec::new(),
            config,
        }
    }

    pub fn register<C: Component + Default>(self) -> Self {
        self.register_with::<C>(RowOptions::default())
    }

    /// Adds `C` as the next row. Registering a type twice keeps the first row.
    pub fn register_with<C: Component + Default>(mut self, options: RowOptions) -> Self {
        let type_id = TypeId::of::<C>();
        if self.rows.iter().any(|row| row.type_id == type_id) {
            warn!("Component {} registered twice, ignoring", type_name::<C>());
            return self;
        }
        if self.rows.len() >= u16::MAX as usize {
            warn!(
                "Row limit of {} reached, not registering {}",
                u16::MAX,
                type_name::<C>()
            );
            return self;
        }

        self.rows.push(ComponentRow {
            name: short_type_name::<C>(),
            type_id,
            factory: make_component::<C>,
            options,
            instances: Vec::new(),
        });
        self
    }

    /// Registry whose components are all authoritative
    pub fn build(self) -> Ecs {
        self.finish(Mode::Authoritative)
    }

    /// Client-side mirror. Components of entities owned by `local_id` are
    /// predicted, everything else is interpolated.
    pub fn build_mirror(self, local_id: impl Into<String>) -> Ecs {
        self.finish(Mode::Mirror {
            local_id: local_id.into(),
        })
    }

    fn finish(self, mode: Mode) -> Ecs {
        if self.rows.is_empty() {
            warn!("Building a registry without any component rows");
        }

        let default_channel = InputChannel::new(self.config.default_channel.clone());
        Ecs {
            rows: self.rows,
            entities: HashMap::new(),
            channels: HashMap::new(),
            default_channel,
            mode,
            config: self.config,
        }
    }
}

impl Default for EcsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_channel<'a>(
    channels: &'a HashMap<String, InputChannel>,
    default: &'a InputChannel,
    owner: Option<&str>,
) -> &'a InputChannel {
    owner
        .and_then(|id| channels.get(id))
        .unwrap_or(default)
}

/// Entity/component registry.
///
/// Components live in rows, one row per registered type. Every phase walks
/// the rows in registration order and each row's instances in insertion
/// order, so simulation order is identical on the server and on clients.
pub struct Ecs {
    rows: Vec<ComponentRow>,
    entities: HashMap<EntityId, Entity>,
    channels: HashMap<String, InputChannel>,
    default_channel: InputChannel,
    mode: Mode,
    config: SyncConfig,
}

impl Ecs {
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_mirror(&self) -> bool {
        matches!(self.mode, Mode::Mirror { .. })
    }

    /// Client id this mirror predicts for
    pub fn local_id(&self) -> Option<&str> {
        match &self.mode {
            Mode::Mirror { local_id } => Some(local_id),
            Mode::Authoritative => None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row_name(&self, row: usize) -> Option<&'static str> {
        self.rows.get(row).map(|r| r.name)
    }

    pub fn row_of<C: Component>(&self) -> SyncResult<usize> {
        let type_id = TypeId::of::<C>();
        self.rows
            .iter()
            .position(|row| row.type_id == type_id)
            .ok_or(SyncError::UnregisteredComponent {
                component: type_name::<C>(),
            })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn create_entity(&mut self, id: Option<&str>) -> EntityId {
        self.spawn(id, None)
    }

    /// Creates an entity owned by `owner` and attaches the default rows.
    ///
    /// Without an id a random 6-digit hex id is generated. An id that is
    /// already taken returns the existing entity untouched.
    pub fn spawn(&mut self, id: Option<&str>, owner: Option<&str>) -> EntityId {
        let id = match id {
            Some(id) if self.entities.contains_key(id) => {
                warn!("Entity '{}' already exists, returning existing entity", id);
                return id.to_string();
            }
            Some(id) => id.to_string(),
            None => self.generate_id(),
        };

        self.entities.insert(
            id.clone(),
            Entity {
                id: id.clone(),
                owner: owner.map(str::to_string),
                components: BTreeMap::new(),
                destroyed: false,
            },
        );

        let defaults: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.options.is_default)
            .map(|(index, _)| index)
            .collect();
        for row in defaults {
            let component = (self.rows[row].factory)();
            self.attach(&id, row, component);
        }

        debug!("Spawned entity '{}' (owner {:?})", id, owner);
        id
    }

    fn generate_id(&self) -> EntityId {
        let mut rng = rand::thread_rng();
        loop {
            let id = format!("{:06x}", rng.gen_range(0..0x100_0000u32));
            if !self.entities.contains_key(&id) {
                return id;
            }
        }
    }

    fn role_for(&self, owner: Option<&str>) -> SyncRole {
        match &self.mode {
            Mode::Authoritative => SyncRole::Authoritative,
            Mode::Mirror { local_id } if owner == Some(local_id.as_str()) => {
                SyncRole::Predicted(PredictionBuffer::new(self.config.max_input_queue))
            }
            Mode::Mirror { .. } => {
                SyncRole::Interpolated(Interpolator::new(self.config.extrapolation_limit))
            }
        }
    }

    /// Stores a component in a row the entity does not have yet
    fn attach(&mut self, id: &str, row: usize, component: Box<dyn SyncComponent>) {
        let owner = self.entities.get(id).and_then(|e| e.owner.clone());
        let role = self.role_for(owner.as_deref());

        if let Some(entity) = self.entities.get_mut(id) {
            entity.components.insert(
                row,
                ComponentSlot {
                    component,
                    started: false,
                    role,
                },
            );
            self.rows[row].instances.push(id.to_string());
        }
    }

    fn check_slot(&self, id: &str, row: usize) -> SyncResult<bool> {
        if row >= self.rows.len() {
            return Err(SyncError::UnknownRow { row });
        }
        let entity = self
            .entities
            .get(id)
            .ok_or_else(|| SyncError::UnknownEntity { id: id.to_string() })?;

        if entity.components.contains_key(&row) {
            warn!(
                "Entity '{}' already has a {} component, keeping it",
                id, self.rows[row].name
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Attaches a default-constructed component of the given row
    pub fn add_component_at(&mut self, id: &str, row: usize) -> SyncResult<usize> {
        if self.check_slot(id, row)? {
            let component = (self.rows[row].factory)();
            self.attach(id, row, component);
        }
        Ok(row)
    }

    pub fn add_component<C: Component>(&mut self, id: &str) -> SyncResult<usize> {
        let row = self.row_of::<C>()?;
        self.add_component_at(id, row)
    }

    /// Attaches an already configured component instance
    pub fn insert_component<C: Component>(&mut self, id: &str, component: C) -> SyncResult<usize> {
        let row = self.row_of::<C>()?;
        if self.check_slot(id, row)? {
            self.attach(id, row, Box::new(Synced::new(component)));
        }
        Ok(row)
    }

    pub fn remove_component_at(&mut self, id: &str, row: usize) -> bool {
        let Some(mut slot) = self
            .entities
            .get_mut(id)
            .and_then(|entity| entity.components.remove(&row))
        else {
            return false;
        };

        slot.component.on_destroy();
        if let Some(r) = self.rows.get_mut(row) {
            r.instances.retain(|instance| instance != id);
        }
        true
    }

    pub fn remove_component<C: Component>(&mut self, id: &str) -> bool {
        match self.row_of::<C>() {
            Ok(row) => self.remove_component_at(id, row),
            Err(_) => false,
        }
    }

    /// Removes an entity together with its components.
    ///
    /// Components are disposed first, then the entity is marked destroyed
    /// and handed back to the caller.
    pub fn destroy_entity(&mut self, id: &str) -> Option<Entity> {
        let mut entity = self.entities.remove(id)?;

        for (row, slot) in entity.components.iter_mut() {
            slot.component.on_destroy();
            if let Some(r) = self.rows.get_mut(*row) {
                r.instances.retain(|instance| instance != id);
            }
        }
        entity.destroyed = true;

        debug!("Destroyed entity '{}'", id);
        Some(entity)
    }

    pub fn get_component<C: Component>(&self, id: &str) -> Option<&C> {
        let row = self.row_of::<C>().ok()?;
        self.entities
            .get(id)?
            .components
            .get(&row)?
            .component
            .as_any()
            .downcast_ref::<C>()
    }

    pub fn get_component_mut<C: Component>(&mut self, id: &str) -> Option<&mut C> {
        let row = self.row_of::<C>().ok()?;
        self.entities
            .get_mut(id)?
            .components
            .get_mut(&row)?
            .component
            .as_any_mut()
            .downcast_mut::<C>()
    }

    /// Every instance of `C` with its entity id, in insertion order
    pub fn components_of<C: Component>(&self) -> Vec<(&str, &C)> {
        let Ok(row) = self.row_of::<C>() else {
            return Vec::new();
        };

        self.rows[row]
            .instances
            .iter()
            .filter_map(|id| {
                let entity = self.entities.get(id)?;
                let component = entity.components.get(&row)?.component.as_any().downcast_ref::<C>()?;
                Some((entity.id.as_str(), component))
            })
            .collect()
    }

    pub fn component_state(&self, id: &str, row: usize) -> SyncResult<ComponentState> {
        let entity = self
            .entities
            .get(id)
            .ok_or_else(|| SyncError::UnknownEntity { id: id.to_string() })?;
        let slot = entity
            .components
            .get(&row)
            .ok_or_else(|| SyncError::MissingComponent {
                id: id.to_string(),
                row,
            })?;
        slot.component.get_state()
    }

    /// Creates a channel, or returns the existing one with a warning
    pub fn create_input_channel(&mut self, id: &str) -> &mut InputChannel {
        if id == self.default_channel.id() {
            warn!("Input channel '{}' is the default channel", id);
            return &mut self.default_channel;
        }
        if self.channels.contains_key(id) {
            warn!("Input channel '{}' already exists", id);
        }
        self.ensure_input_channel(id)
    }

    /// Returns the channel with this id, creating it silently if missing
    pub fn ensure_input_channel(&mut self, id: &str) -> &mut InputChannel {
        if id == self.default_channel.id() {
            return &mut self.default_channel;
        }
        self.channels
            .entry(id.to_string())
            .or_insert_with(|| InputChannel::new(id))
    }

    pub fn remove_input_channel(&mut self, id: &str) -> Option<InputChannel> {
        if id == self.default_channel.id() {
            warn!("Refusing to remove the default input channel");
            return None;
        }
        self.channels.remove(id)
    }

    pub fn input_channel(&self, id: &str) -> Option<&InputChannel> {
        if id == self.default_channel.id() {
            return Some(&self.default_channel);
        }
        self.channels.get(id)
    }

    pub fn input_channel_mut(&mut self, id: &str) -> Option<&mut InputChannel> {
        if id == self.default_channel.id() {
            return Some(&mut self.default_channel);
        }
        self.channels.get_mut(id)
    }

    pub fn default_input_channel(&self) -> &InputChannel {
        &self.default_channel
    }

    pub fn default_input_channel_mut(&mut self) -> &mut InputChannel {
        &mut self.default_channel
    }

    /// Runs `start` once for every component that has not started yet
    pub fn run_start(&mut self, time: &Time) {
        for (row, component_row) in self.rows.iter().enumerate() {
            for id in &component_row.instances {
                let Some(entity) = self.entities.get_mut(id) else {
                    continue;
                };
                let Some(slot) = entity.components.get_mut(&row) else {
                    continue;
                };
                if slot.started {
                    continue;
                }

                let input =
                    resolve_channel(&self.channels, &self.default_channel, entity.owner.as_deref());
                let cx = TickContext {
                    time,
                    input,
                    entity: id,
                };
                slot.component.start(&cx);
                slot.started = true;
            }
        }
    }

    /// Runs `update` on authoritative and predicted components.
    ///
    /// Each component reads the input channel of its entity's owner, or the
    /// default channel when the owner has none.
    pub fn run_update(&mut self, time: &Time) {
        for (row, component_row) in self.rows.iter().enumerate() {
            for id in &component_row.instances {
                let Some(entity) = self.entities.get_mut(id) else {
                    continue;
                };
                let Some(slot) = entity.components.get_mut(&row) else {
                    continue;
                };
                if !slot.role.simulates() {
                    continue;
                }

                let input =
                    resolve_channel(&self.channels, &self.default_channel, entity.owner.as_deref());
                let cx = TickContext {
                    time,
                    input,
                    entity: id,
                };
                slot.component.update(&cx);
            }
        }
    }

    /// Integrates every interpolated component by `dt` seconds
    pub fn advance_interpolation(&mut self, dt: f64) -> SyncResult<()> {
        for (row, component_row) in self.rows.iter().enumerate() {
            for id in &component_row.instances {
                let Some(slot) = self
                    .entities
                    .get_mut(id)
                    .and_then(|entity| entity.components.get_mut(&row))
                else {
                    continue;
                };
                if let SyncRole::Interpolated(interpolator) = &mut slot.role {
                    interpolator.advance(slot.component.as_mut(), dt)?;
                }
            }
        }
        Ok(())
    }

    /// Appends an input record to every predicted component's buffer
    pub fn record_input(&mut self, time: &Time, index: u32, frame: &InputFrame) {
        for entity in self.entities.values_mut() {
            for slot in entity.components.values_mut() {
                if let SyncRole::Predicted(buffer) = &mut slot.role {
                    buffer.record(*time, index, frame.clone());
                }
            }
        }
    }

    /// Number of unacknowledged inputs held for a predicted component
    pub fn pending_inputs(&self, id: &str, row: usize) -> Option<usize> {
        match &self.entities.get(id)?.components.get(&row)?.role {
            SyncRole::Predicted(buffer) => Some(buffer.len()),
            _ => None,
        }
    }

    /// Routes an authoritative state to a component according to its role.
    ///
    /// Predicted components are reconciled against `acked_index`,
    /// interpolated ones take it as a new snapshot spaced by the estimated
    /// server tick interval, authoritative ones adopt it directly.
    pub fn apply_authoritative_state(
        &mut self,
        id: &str,
        row: usize,
        state: &[Value],
        acked_index: u32,
        server_time: &Time,
    ) -> SyncResult<()> {
        if row >= self.rows.len() {
            return Err(SyncError::UnknownRow { row });
        }
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| SyncError::UnknownEntity { id: id.to_string() })?;
        let slot = entity
            .components
            .get_mut(&row)
            .ok_or_else(|| SyncError::MissingComponent {
                id: id.to_string(),
                row,
            })?;

        match &mut slot.role {
            SyncRole::Predicted(buffer) => {
                let channel_id = entity
                    .owner
                    .as_deref()
                    .unwrap_or(self.default_channel.id())
                    .to_string();
                let channel = if channel_id == self.default_channel.id() {
                    &mut self.default_channel
                } else {
                    self.channels
                        .get_mut(&channel_id)
                        .ok_or(SyncError::UnknownChannel { id: channel_id })?
                };
                buffer.reconcile(slot.component.as_mut(), channel, state, acked_index, id)?;
            }
            SyncRole::Interpolated(interpolator) => {
                interpolator.on_snapshot(
                    slot.component.as_mut(),
                    state,
                    server_time.dt_average(),
                )?;
            }
            SyncRole::Authoritative => slot.component.set_state(state)?,
        }
        Ok(())
    }

    /// Captures every component state, grouped by entity.
    ///
    /// Rows are visited in registration order; entities appear in the order
    /// they are first met. Entities without components are left out.
    pub fn collect_states(&self) -> SyncResult<Vec<EntitySnapshot>> {
        let mut snapshots: Vec<EntitySnapshot> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for (row, component_row) in self.rows.iter().enumerate() {
            for id in &component_row.instances {
                let Some(entity) = self.entities.get(id) else {
                    continue;
                };
                let Some(slot) = entity.components.get(&row) else {
                    continue;
                };
                let state = slot.component.get_state()?;

                let position = *positions.entry(id.as_str()).or_insert_with(|| {
                    snapshots.push(EntitySnapshot {
                        id: entity.id.clone(),
                        owner: entity.owner.clone(),
                        components: Vec::new(),
                    });
                    snapshots.len() - 1
                });
                snapshots[position].components.push((row, state));
            }
        }

        Ok(snapshots)
    }
}
