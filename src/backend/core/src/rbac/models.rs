//! RBAC data models: entity names and kinds, roles, actions, memberships and subjects.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Name of an entity type declared in the hierarchy (e.g. `organization`, `attachment`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityName(pub String);

impl EntityName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&EntityName> for EntityName {
    fn from(name: &EntityName) -> Self {
        name.clone()
    }
}

impl Borrow<str> for EntityName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for EntityName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EntityName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A role name drawn from the [`RoleRegistry`](super::roles::RoleRegistry).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&Role> for Role {
    fn from(role: &Role) -> Self {
        role.clone()
    }
}

impl Borrow<str> for Role {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for Role {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Strongly-typed user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entity kinds
// ═══════════════════════════════════════════════════════════════════════════════

/// The three kinds of entity a hierarchy can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// The single, role-less user entity.
    User,
    /// Carries role-based memberships and scopes everything beneath it.
    Context,
    /// Content scoped under contexts; inherits permissions from them.
    Product,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Context => "context",
            Self::Product => "product",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Actions
// ═══════════════════════════════════════════════════════════════════════════════

/// The closed set of CRUD-style actions a policy can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Search,
}

impl Action {
    /// Number of actions.
    pub const COUNT: usize = 5;

    /// Every action, in the fixed order used for iteration and display.
    pub const ALL: [Action; Action::COUNT] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Search,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown action `{s}`"))
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A fixed-size map with one slot per [`Action`].
///
/// Indexed by the action discriminant, so lookups never hash. Serializes as a
/// map keyed by the lowercase action name; missing keys deserialize to
/// `T::default()`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionMap<T>([T; Action::COUNT]);

impl<T> ActionMap<T> {
    /// Build a map by calling `f` once per action, in [`Action::ALL`] order.
    pub fn from_fn(mut f: impl FnMut(Action) -> T) -> Self {
        Self(std::array::from_fn(|i| f(Action::ALL[i])))
    }

    pub fn get(&self, action: Action) -> &T {
        &self.0[action.index()]
    }

    pub fn get_mut(&mut self, action: Action) -> &mut T {
        &mut self.0[action.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Action, &T)> + '_ {
        Action::ALL.iter().map(move |&action| (action, &self.0[action.index()]))
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> ActionMap<U> {
        ActionMap::from_fn(|action| f(self.get(action)))
    }
}

impl<T> Index<Action> for ActionMap<T> {
    type Output = T;

    fn index(&self, action: Action) -> &T {
        self.get(action)
    }
}

impl<T> IndexMut<Action> for ActionMap<T> {
    fn index_mut(&mut self, action: Action) -> &mut T {
        self.get_mut(action)
    }
}

impl<T: Serialize> Serialize for ActionMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Action::COUNT))?;
        for (action, value) in self.iter() {
            map.serialize_entry(action.as_str(), value)?;
        }
        map.end()
    }
}

impl<'de, T> Deserialize<'de> for ActionMap<T>
where
    T: Deserialize<'de> + Default,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ActionMapVisitor<T>(PhantomData<T>);

        impl<'de, T> Visitor<'de> for ActionMapVisitor<T>
        where
            T: Deserialize<'de> + Default,
        {
            type Value = ActionMap<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map keyed by action name")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out = ActionMap::from_fn(|_| T::default());
                while let Some(key) = access.next_key::<String>()? {
                    let action: Action = key.parse().map_err(de::Error::custom)?;
                    out[action] = access.next_value()?;
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(ActionMapVisitor(PhantomData))
    }
}

/// Which actions a single `(context type, role)` policy entry allows.
pub type ActionPermissions = ActionMap<bool>;

impl ActionMap<bool> {
    /// Every action allowed.
    pub fn all() -> Self {
        Self([true; Action::COUNT])
    }

    /// Every action denied.
    pub fn none() -> Self {
        Self([false; Action::COUNT])
    }

    /// Allow the given actions and deny everything else.
    pub fn only(actions: &[Action]) -> Self {
        let mut perms = Self::none();
        for &action in actions {
            perms[action] = true;
        }
        perms
    }

    /// Builder-style setter.
    pub fn with(mut self, action: Action, allowed: bool) -> Self {
        self[action] = allowed;
        self
    }

    pub fn allows(&self, action: Action) -> bool {
        self[action]
    }

    /// Actions set to `true`, in [`Action::ALL`] order.
    pub fn granted(&self) -> impl Iterator<Item = Action> + '_ {
        self.iter().filter(|(_, &allowed)| allowed).map(|(action, _)| action)
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|&allowed| allowed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Context ids
// ═══════════════════════════════════════════════════════════════════════════════

/// The context-id fields carried by a membership or subject, keyed by context type.
///
/// A key with a `None` value means "the field exists but is empty", which the
/// engine treats as "no id for this context". A missing key means the field is
/// absent from the shape entirely.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextIds(BTreeMap<EntityName, Option<String>>);

impl ContextIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, context_type: impl Into<EntityName>, id: impl Into<String>) {
        self.0.insert(context_type.into(), Some(id.into()));
    }

    /// Record the field without a value.
    pub fn insert_unset(&mut self, context_type: impl Into<EntityName>) {
        self.0.insert(context_type.into(), None);
    }

    /// The id stored for `context_type`, if the field is present and set.
    pub fn get(&self, context_type: &str) -> Option<&str> {
        self.0.get(context_type).and_then(|id| id.as_deref())
    }

    /// Whether the field is present, set or not.
    pub fn has_field(&self, context_type: &str) -> bool {
        self.0.contains_key(context_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityName, Option<&str>)> {
        self.0.iter().map(|(name, id)| (name, id.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ContextIds
where
    K: Into<EntityName>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ids = Self::new();
        for (context_type, id) in iter {
            ids.insert(context_type, id);
        }
        ids
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Membership
// ═══════════════════════════════════════════════════════════════════════════════

/// A user's grant of `role` within one instance of `context_type`.
///
/// The instance is identified by the membership's own entry in `context_ids`
/// (e.g. the `organization` id for an organization membership). Memberships
/// may also carry the ids of the ancestors of that instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub context_type: EntityName,
    pub role: Role,
    #[serde(default)]
    pub context_ids: ContextIds,
}

impl Membership {
    /// Create a membership of `role` in the `context_type` instance `context_id`.
    pub fn new(
        context_type: impl Into<EntityName>,
        context_id: impl Into<String>,
        role: impl Into<Role>,
    ) -> Self {
        let context_type = context_type.into();
        let mut context_ids = ContextIds::new();
        context_ids.insert(context_type.clone(), context_id);
        Self {
            user_id: None,
            context_type,
            role: role.into(),
            context_ids,
        }
    }

    /// Record the id of an ancestor context of this membership's context.
    pub fn with_context(mut self, context_type: impl Into<EntityName>, id: impl Into<String>) -> Self {
        self.context_ids.insert(context_type, id);
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(UserId::new(user_id));
        self
    }

    /// The id of the context instance this membership belongs to.
    pub fn context_id(&self) -> Option<&str> {
        self.context_ids.get(self.context_type.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Subject
// ═══════════════════════════════════════════════════════════════════════════════

/// The entity instance a permission check is made against.
///
/// A context subject's own `id` doubles as its id for its own context type. A
/// product subject carries the id of each ancestor context it is scoped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub entity_type: EntityName,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub context_ids: ContextIds,
}

impl Subject {
    pub fn new(entity_type: impl Into<EntityName>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: Some(id.into()),
            context_ids: ContextIds::new(),
        }
    }

    /// A subject that has no id yet.
    pub fn unsaved(entity_type: impl Into<EntityName>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: None,
            context_ids: ContextIds::new(),
        }
    }

    pub fn with_context(mut self, context_type: impl Into<EntityName>, id: impl Into<String>) -> Self {
        self.context_ids.insert(context_type, id);
        self
    }

    /// Declare the context-id field without a value.
    pub fn with_unset_context(mut self, context_type: impl Into<EntityName>) -> Self {
        self.context_ids.insert_unset(context_type);
        self
    }

    /// The subject's id for `context_type`: its own id when the subject is
    /// that context, otherwise the stored context-id field.
    pub fn context_id_for(&self, context_type: &str) -> Option<&str> {
        if self.entity_type == context_type {
            self.id.as_deref()
        } else {
            self.context_ids.get(context_type)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
