//! Component model: sync-property declaration and state capture

use crate::error::{SyncError, SyncResult};
use crate::input::InputChannel;
use crate::state::{ComponentState, Value};
use crate::time::Time;
use std::any::{type_name, Any};

/// Everything a component update may depend on.
///
/// Updates that are replayed during reconciliation must be a pure function
/// of the component's state and this context.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub time: &'a Time,
    pub input: &'a InputChannel,
    pub entity: &'a str,
}

/// Getter half of a custom sync property
pub type CustomGetter<C> = fn(&C) -> ComponentState;

/// Setter half of a custom sync property
pub type CustomSetter<C> = fn(&mut C, &[Value]) -> SyncResult<()>;

/// A declared piece of replicated state
pub enum SyncProperty<C> {
    /// Field read and written through [`Component::field`] / [`Component::set_field`]
    Named(String),
    /// Getter/setter pair producing a nested state
    Custom {
        get: CustomGetter<C>,
        set: CustomSetter<C>,
    },
}

impl<C> SyncProperty<C> {
    fn label(&self) -> String {
        match self {
            SyncProperty::Named(name) => name.clone(),
            SyncProperty::Custom { .. } => "<custom>".to_string(),
        }
    }
}

/// Ordered sync-property list of one component instance.
///
/// Filled during [`Component::init`] and sealed right after; the order is
/// the wire layout of the component's state.
pub struct SyncSchema<C> {
    properties: Vec<SyncProperty<C>>,
    sealed: bool,
}

impl<C> SyncSchema<C> {
    fn new() -> Self {
        Self {
            properties: Vec::new(),
            sealed: false,
        }
    }

    pub fn named(&mut self, name: impl Into<String>) -> &mut Self {
        self.properties.push(SyncProperty::Named(name.into()));
        self
    }

    pub fn custom(&mut self, get: CustomGetter<C>, set: CustomSetter<C>) -> &mut Self {
        self.properties.push(SyncProperty::Custom { get, set });
        self
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

/// Game-logic component with replicated state.
///
/// Implementors list their sync properties in `init`, expose named fields
/// through `field` / `set_field`, and put their deterministic simulation in
/// `update`.
pub trait Component: Sized + 'static {
    /// One-time declaration of the sync properties
    fn init(&mut self, schema: &mut SyncSchema<Self>);

    fn field(&self, name: &str) -> Option<Value> {
        let _ = name;
        None
    }

    fn set_field(&mut self, name: &str, value: Value) -> SyncResult<()> {
        let _ = value;
        Err(unknown_property::<Self>(name))
    }

    fn start(&mut self, cx: &TickContext<'_>) {
        let _ = cx;
    }

    fn update(&mut self, cx: &TickContext<'_>) {
        let _ = cx;
    }

    fn on_destroy(&mut self) {}
}

/// Error for a name that is not one of `C`'s fields
pub fn unknown_property<C>(name: &str) -> SyncError {
    SyncError::PropertyNotFound {
        component: type_name::<C>(),
        property: name.to_string(),
    }
}

/// Reads a number for field `name` of `C`, rejecting other value kinds
pub fn number_field<C>(name: &str, value: &Value) -> SyncResult<f64> {
    value.as_number().ok_or_else(|| SyncError::FieldType {
        component: type_name::<C>(),
        property: name.to_string(),
        expected: "number",
        found: value.kind(),
    })
}

/// Reads a string for field `name` of `C`, rejecting other value kinds
pub fn text_field<C>(name: &str, value: &Value) -> SyncResult<String> {
    value
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| SyncError::FieldType {
            component: type_name::<C>(),
            property: name.to_string(),
            expected: "text",
            found: value.kind(),
        })
}

/// Type-erased component as stored by the registry
pub trait SyncComponent: Any {
    fn type_name(&self) -> &'static str;
    fn get_state(&self) -> SyncResult<ComponentState>;
    fn set_state(&mut self, state: &[Value]) -> SyncResult<()>;
    fn property_count(&self) -> usize;
    fn start(&mut self, cx: &TickContext<'_>);
    fn update(&mut self, cx: &TickContext<'_>);
    fn on_destroy(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A component paired with its sealed sync schema
pub struct Synced<C: Component> {
    component: C,
    schema: SyncSchema<C>,
}

impl<C: Component> Synced<C> {
    /// Runs the component's init and seals its schema
    pub fn new(mut component: C) -> Self {
        let mut schema = SyncSchema::new();
        component.init(&mut schema);
        schema.sealed = true;
        Self { component, schema }
    }

    pub fn inner(&self) -> &C {
        &self.component
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.component
    }

    pub fn schema(&self) -> &SyncSchema<C> {
        &self.schema
    }

    /// Late declaration. Always fails once init has run, since the wire
    /// layout of this component type is already fixed.
    pub fn declare(&mut self, property: SyncProperty<C>) -> SyncResult<()> {
        if self.schema.sealed {
            return Err(SyncError::DeclaredAfterInit {
                component: type_name::<C>(),
                property: property.label(),
            });
        }
        self.schema.properties.push(property);
        Ok(())
    }
}

impl<C: Component> SyncComponent for Synced<C> {
    fn type_name(&self) -> &'static str {
        type_name::<C>()
    }

    fn get_state(&self) -> SyncResult<ComponentState> {
        let mut state = Vec::with_capacity(self.schema.properties.len());

        for property in &self.schema.properties {
            let (label, value) = match property {
                SyncProperty::Named(name) => {
                    let value = self
                        .component
                        .field(name)
                        .ok_or_else(|| unknown_property::<C>(name))?;
                    (name.as_str(), value)
                }
                SyncProperty::Custom { get, .. } => ("<custom>", Value::List(get(&self.component))),
            };

            value
                .check_serializable()
                .map_err(|reason| SyncError::NotSerializable {
                    component: type_name::<C>(),
                    property: label.to_string(),
                    reason,
                })?;

            state.push(value);
        }

        Ok(state)
    }

    fn set_state(&mut self, state: &[Value]) -> SyncResult<()> {
        let expected = self.schema.properties.len();
        if state.len() < expected {
            return Err(SyncError::StateTooShort {
                component: type_name::<C>(),
                expected,
                found: state.len(),
            });
        }

        for (position, (property, value)) in self.schema.properties.iter().zip(state).enumerate() {
            match property {
                SyncProperty::Named(name) => self.component.set_field(name, value.clone())?,
                SyncProperty::Custom { set, .. } => match value {
                    Value::List(substate) => set(&mut self.component, substate)?,
                    other => {
                        return Err(SyncError::ShapeMismatch {
                            component: type_name::<C>(),
                            position,
                            found: other.kind(),
                        })
                    }
                },
            }
        }

        Ok(())
    }

    fn property_count(&self) -> usize {
        self.schema.properties.len()
    }

    fn start(&mut self, cx: &TickContext<'_>) {
        self.component.start(cx);
    }

    fn update(&mut self, cx: &TickContext<'_>) {
        self.component.update(cx);
    }

    fn on_destroy(&mut self) {
        self.component.on_destroy();
    }

    fn as_any(&self) -> &dyn Any {
        &self.component
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        &mut self.component
    }
}
