//! [`SubtypeCollection`] – the per-API set of live resources.
//!
//! Readers never block on writers: the table is an immutable snapshot behind
//! an `Arc`, and every mutation builds a fresh table and swaps it in.  A
//! lookup therefore observes either the table before a [`replace_all`] or the
//! one after it, never a mix of both.
//!
//! [`replace_all`]: SubtypeCollection::replace_all

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rdk_types::{Api, RdkError, ResourceName};

use crate::resource::{Resource, ResourceHandle};

struct Entry<T: ?Sized> {
    name: ResourceName,
    resource: Arc<T>,
}

impl<T: ?Sized> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            resource: Arc::clone(&self.resource),
        }
    }
}

struct Table<T: ?Sized> {
    /// Keyed by short name (`remote:local` or `local`).
    by_short: HashMap<String, Entry<T>>,
    /// Local name of a remote resource → its short name, or `None` when more
    /// than one remote exposes that local name.
    by_local: HashMap<String, Option<String>>,
}

impl<T: ?Sized> Table<T> {
    fn build(entries: impl IntoIterator<Item = Entry<T>>) -> Self {
        let by_short: HashMap<String, Entry<T>> = entries
            .into_iter()
            .map(|e| (e.name.short_name(), e))
            .collect();

        let mut by_local: HashMap<String, Option<String>> = HashMap::new();
        for (short, entry) in &by_short {
            if !entry.name.is_remote() {
                continue;
            }
            by_local
                .entry(entry.name.name.clone())
                .and_modify(|slot| *slot = None)
                .or_insert_with(|| Some(short.clone()));
        }

        Self { by_short, by_local }
    }

    fn get(&self, name: &str) -> Option<&Entry<T>> {
        if let Some(entry) = self.by_short.get(name) {
            return Some(entry);
        }
        match self.by_local.get(name) {
            Some(Some(short)) => self.by_short.get(short),
            _ => None,
        }
    }
}

/// All live resources of one API, keyed by name.
pub struct SubtypeCollection<T: ?Sized> {
    api: Api,
    table: RwLock<Arc<Table<T>>>,
}

impl<T: ?Sized + Resource> SubtypeCollection<T> {
    pub fn new(api: Api) -> Self {
        Self {
            api,
            table: RwLock::new(Arc::new(Table::build(Vec::new()))),
        }
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    fn snapshot(&self) -> Arc<Table<T>> {
        Arc::clone(&self.table.read())
    }

    fn check_api(&self, name: &ResourceName) -> Result<(), RdkError> {
        if name.api != self.api {
            return Err(RdkError::TypeMismatch {
                name: name.to_string(),
                expected: self.api.to_string(),
            });
        }
        Ok(())
    }

    /// Look a resource up by short name.
    ///
    /// A remote resource may also be found by its bare local name as long as
    /// exactly one remote exposes that name and no local resource shadows it.
    ///
    /// # Errors
    ///
    /// [`RdkError::NotFound`] when nothing answers to `name`.
    pub fn resource(&self, name: &str) -> Result<Arc<T>, RdkError> {
        self.snapshot()
            .get(name)
            .map(|e| Arc::clone(&e.resource))
            .ok_or_else(|| RdkError::NotFound(format!("{}/{name}", self.api)))
    }

    /// Full name of the resource that answers to `name`.
    pub fn resolve_name(&self, name: &str) -> Option<ResourceName> {
        self.snapshot().get(name).map(|e| e.name.clone())
    }

    /// Add one resource.
    ///
    /// # Errors
    ///
    /// [`RdkError::TypeMismatch`] when `name` belongs to another API and
    /// [`RdkError::DuplicateResource`] when the name is already taken.
    pub fn insert(&self, name: ResourceName, resource: Arc<T>) -> Result<(), RdkError> {
        self.check_api(&name)?;
        let mut guard = self.table.write();
        if guard.by_short.contains_key(&name.short_name()) {
            return Err(RdkError::DuplicateResource(name.to_string()));
        }
        let mut entries: Vec<Entry<T>> = guard.by_short.values().cloned().collect();
        entries.push(Entry { name, resource });
        *guard = Arc::new(Table::build(entries));
        Ok(())
    }

    pub fn remove(&self, name: &ResourceName) -> bool {
        let mut guard = self.table.write();
        if !guard.by_short.contains_key(&name.short_name()) {
            return false;
        }
        let entries: Vec<Entry<T>> = guard
            .by_short
            .values()
            .filter(|e| &e.name != name)
            .cloned()
            .collect();
        *guard = Arc::new(Table::build(entries));
        true
    }

    /// Atomically swap the whole table.
    ///
    /// # Errors
    ///
    /// [`RdkError::TypeMismatch`] when any name belongs to another API; the
    /// current table is left untouched.
    pub fn replace_all(&self, resources: HashMap<ResourceName, Arc<T>>) -> Result<(), RdkError> {
        for name in resources.keys() {
            self.check_api(name)?;
        }
        let table = Table::build(
            resources
                .into_iter()
                .map(|(name, resource)| Entry { name, resource }),
        );
        *self.table.write() = Arc::new(table);
        Ok(())
    }

    pub fn names(&self) -> Vec<ResourceName> {
        let mut names: Vec<ResourceName> = self
            .snapshot()
            .by_short
            .values()
            .map(|e| e.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.snapshot().by_short.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Type-erased access
// ─────────────────────────────────────────────────────────────────────────────

/// Object-safe face of a [`SubtypeCollection`] so a robot can hold one
/// collection per API without knowing every capability type.
pub trait AnyCollection: Send + Sync {
    fn api(&self) -> &Api;

    /// Replace the whole table from type-erased handles.
    ///
    /// # Errors
    ///
    /// [`RdkError::TypeMismatch`] when a handle does not satisfy the API.
    fn replace_all_handles(&self, handles: Vec<ResourceHandle>) -> Result<(), RdkError>;

    fn insert_handle(&self, handle: &ResourceHandle) -> Result<(), RdkError>;

    fn remove(&self, name: &ResourceName) -> bool;

    fn names(&self) -> Vec<ResourceName>;

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: ?Sized + Resource> AnyCollection for SubtypeCollection<T> {
    fn api(&self) -> &Api {
        &self.api
    }

    fn replace_all_handles(&self, handles: Vec<ResourceHandle>) -> Result<(), RdkError> {
        let mut resources = HashMap::with_capacity(handles.len());
        for handle in handles {
            let typed = handle.downcast::<T>()?;
            resources.insert(handle.name().clone(), typed);
        }
        self.replace_all(resources)
    }

    fn insert_handle(&self, handle: &ResourceHandle) -> Result<(), RdkError> {
        let typed = handle.downcast::<T>()?;
        self.insert(handle.name().clone(), typed)
    }

    fn remove(&self, name: &ResourceName) -> bool {
        SubtypeCollection::remove(self, name)
    }

    fn names(&self) -> Vec<ResourceName> {
        SubtypeCollection::names(self)
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Recover the typed collection behind an [`AnyCollection`].
///
/// # Errors
///
/// [`RdkError::TypeMismatch`] when the collection holds another capability.
pub fn downcast_collection<T: ?Sized + Resource>(
    collection: Arc<dyn AnyCollection>,
) -> Result<Arc<SubtypeCollection<T>>, RdkError> {
    let api = collection.api().to_string();
    collection
        .as_any()
        .downcast::<SubtypeCollection<T>>()
        .map_err(|_| RdkError::TypeMismatch {
            name: api,
            expected: std::any::type_name::<T>().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    trait Widget: Resource {
        fn serial(&self) -> u32;
    }

    impl std::fmt::Debug for dyn Widget {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Widget").field("name", &self.name()).finish()
        }
    }

    trait Gadget: Resource {}

    struct Part {
        name: ResourceName,
        serial: u32,
    }

    impl Resource for Part {
        fn name(&self) -> ResourceName {
            self.name.clone()
        }
    }

    impl Widget for Part {
        fn serial(&self) -> u32 {
            self.serial
        }
    }

    fn api() -> Api {
        Api::component("widget")
    }

    fn part(name: &str, serial: u32) -> (ResourceName, Arc<dyn Widget>) {
        let name = ResourceName::new(api(), name);
        let part: Arc<dyn Widget> = Arc::new(Part {
            name: name.clone(),
            serial,
        });
        (name, part)
    }

    #[test]
    fn lookup_by_short_name() {
        let coll = SubtypeCollection::<dyn Widget>::new(api());
        let (name, w) = part("w1", 1);
        coll.insert(name, w).unwrap();

        assert_eq!(coll.resource("w1").unwrap().serial(), 1);
        assert!(coll.resource("w2").unwrap_err().is_not_found());
    }

    #[test]
    fn insert_refuses_a_taken_name() {
        let coll = SubtypeCollection::<dyn Widget>::new(api());
        let (name, w) = part("w1", 1);
        coll.insert(name.clone(), w).unwrap();

        let (_, again) = part("w1", 2);
        let err = coll.insert(name, again).unwrap_err();
        assert!(matches!(err, RdkError::DuplicateResource(_)));
        assert_eq!(coll.resource("w1").unwrap().serial(), 1);
    }

    #[test]
    fn remote_resource_found_by_local_name_when_unambiguous() {
        let coll = SubtypeCollection::<dyn Widget>::new(api());
        coll.replace_all(HashMap::from([part("r1:arm", 7)])).unwrap();

        assert_eq!(coll.resource("arm").unwrap().serial(), 7);
        assert_eq!(coll.resource("r1:arm").unwrap().serial(), 7);
        assert_eq!(coll.resolve_name("arm").unwrap().short_name(), "r1:arm");
    }

    #[test]
    fn ambiguous_local_name_is_not_found() {
        let coll = SubtypeCollection::<dyn Widget>::new(api());
        coll.replace_all(HashMap::from([part("r1:arm", 1), part("r2:arm", 2)]))
            .unwrap();

        assert!(coll.resource("arm").is_err());
        assert_eq!(coll.resource("r2:arm").unwrap().serial(), 2);
    }

    #[test]
    fn local_resource_shadows_remote() {
        let coll = SubtypeCollection::<dyn Widget>::new(api());
        coll.replace_all(HashMap::from([part("r1:arm", 1), part("arm", 2)]))
            .unwrap();
        assert_eq!(coll.resource("arm").unwrap().serial(), 2);
    }

    #[test]
    fn replace_all_swaps_whole_table() {
        let coll = SubtypeCollection::<dyn Widget>::new(api());
        coll.replace_all(HashMap::from([part("a", 1), part("b", 2)])).unwrap();
        coll.replace_all(HashMap::from([part("c", 3)])).unwrap();

        assert!(coll.resource("a").is_err());
        assert_eq!(coll.names().len(), 1);
    }

    #[test]
    fn foreign_api_is_rejected_and_table_kept() {
        let coll = SubtypeCollection::<dyn Widget>::new(api());
        coll.replace_all(HashMap::from([part("a", 1)])).unwrap();

        let foreign = ResourceName::new(Api::component("motor"), "m1");
        let (_, w) = part("m1", 9);
        let err = coll.replace_all(HashMap::from([(foreign, w)])).unwrap_err();
        assert!(matches!(err, RdkError::TypeMismatch { .. }));
        assert_eq!(coll.resource("a").unwrap().serial(), 1);
    }

    #[test]
    fn insert_handle_checks_capability() {
        let coll = SubtypeCollection::<dyn Gadget>::new(api());
        let (_, w) = part("w1", 1);
        let handle = ResourceHandle::new(w);
        let err = coll.insert_handle(&handle).unwrap_err();
        assert!(matches!(err, RdkError::TypeMismatch { .. }));
    }

    #[test]
    fn remove_drops_entry() {
        let coll = SubtypeCollection::<dyn Widget>::new(api());
        let (name, w) = part("w1", 1);
        coll.insert(name.clone(), w).unwrap();
        assert!(coll.remove(&name));
        assert!(!coll.remove(&name));
        assert!(coll.is_empty());
    }

    #[test]
    fn erased_collection_downcasts_back() {
        let erased: Arc<dyn AnyCollection> = Arc::new(SubtypeCollection::<dyn Widget>::new(api()));
        let (_, w) = part("w1", 4);
        erased
            .replace_all_handles(vec![ResourceHandle::new(w)])
            .unwrap();

        let typed = downcast_collection::<dyn Widget>(Arc::clone(&erased)).unwrap();
        assert_eq!(typed.resource("w1").unwrap().serial(), 4);
        assert!(downcast_collection::<dyn Gadget>(erased).is_err());
    }

    #[test]
    fn readers_see_whole_tables_during_replacement() {
        let coll = Arc::new(SubtypeCollection::<dyn Widget>::new(api()));
        coll.replace_all(HashMap::from([part("a", 1), part("b", 1)])).unwrap();

        let writer = {
            let coll = Arc::clone(&coll);
            thread::spawn(move || {
                for serial in 2..200u32 {
                    coll.replace_all(HashMap::from([part("a", serial), part("b", serial)]))
                        .unwrap();
                }
            })
        };

        for _ in 0..200 {
            let snapshot = coll.snapshot();
            let a = snapshot.get("a").unwrap().resource.serial();
            let b = snapshot.get("b").unwrap().resource.serial();
            assert_eq!(a, b);
        }
        writer.join().unwrap();
    }
}
