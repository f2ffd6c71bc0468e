//! Collection tree operations.
//!
//! Every operation authorizes first, then performs its writes inside a single
//! store transaction while holding the write lock, then applies its effects.

mod delete;
mod membership;
mod relocate;
mod visibility;

use std::path::Path;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::auth::{authorize, create_operation, Operation, Subject, User};
use crate::error::{DmsError, DmsResult, COLLISION_ON_RENAME};
use crate::events::Event;
use crate::hub::{DmsHub, Effects};
use crate::storage::{CollectionTree, DmsStore};
use crate::types::{sanitize_name, Collection, CollectionType, UserId};

/// Operation code returned when a folder import is asked not to copy.
pub const IMPORT_WITHOUT_COPY: u32 = 23000;
/// Operation code returned when a folder import is asked not to recurse.
pub const IMPORT_NOT_RECURSIVE: u32 = 42000;

#[derive(Clone, Debug)]
pub struct NewCollection {
    pub name: String,
    pub color: Option<String>,
    pub parent: Option<Uuid>,
    pub is_private: bool,
    pub kind: CollectionType,
}

impl NewCollection {
    pub fn private(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
            parent: None,
            is_private: true,
            kind: CollectionType::Generic,
        }
    }

    pub fn public(name: impl Into<String>) -> Self {
        Self {
            is_private: false,
            ..Self::private(name)
        }
    }

    pub fn under(mut self, parent: Uuid) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_kind(mut self, kind: CollectionType) -> Self {
        self.kind = kind;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct CollectionUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FolderImport {
    pub root: Collection,
    pub directories: usize,
}

/// Cascades only ever touch collections the acting user owns.
pub(crate) fn owned_by_actor(collection: &Collection, actor: &User) -> bool {
    collection.owned_by(actor.id)
}

/// A live collection in the target set (children of `parent`, or roots)
/// owned by `owner` and named `name`.
pub(crate) fn find_named(
    tree: &CollectionTree,
    parent: Option<Uuid>,
    owner: UserId,
    name: &str,
    exclude: Option<Uuid>,
) -> Option<Uuid> {
    tree.children(parent)
        .into_iter()
        .find(|c| c.owned_by(owner) && c.name == name && Some(c.id) != exclude)
        .map(|c| c.id)
}

pub(crate) fn require_live(tree: &CollectionTree, id: Uuid) -> DmsResult<&Collection> {
    let collection = tree.require(id)?;
    if collection.is_trashed() {
        return Err(DmsError::NotFound(format!(
            "collection {id} is in the trash"
        )));
    }
    Ok(collection)
}

pub(crate) fn insert_collection(
    store: &mut DmsStore,
    actor: &User,
    request: &NewCollection,
    effects: &mut Effects,
) -> DmsResult<Collection> {
    let name = sanitize_name(&request.name)?;
    if let Some(pid) = request.parent {
        require_live(store.tree(), pid)?;
    }
    if find_named(store.tree(), request.parent, actor.id, &name, None).is_some() {
        return Err(DmsError::AlreadyExists {
            name,
            parent: request.parent,
        });
    }
    let mut collection = Collection::new(name, actor.id, request.is_private);
    if let Some(color) = &request.color {
        collection.color = color.clone();
    }
    collection.kind = request.kind;
    let id = match request.parent {
        Some(pid) => store.tree_mut().add_child(pid, collection)?,
        None => store.tree_mut().make_root(collection, 0),
    };
    let created = store.tree().require(id)?.clone();
    tracing::info!(collection = %id, name = %created.name, private = created.is_private, "collection created");
    effects.forget_listing_of(&created);
    effects.emit(Event::Created {
        id,
        parent: request.parent,
    });
    Ok(created)
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn insert_folder_path(
    store: &mut DmsStore,
    actor: &User,
    segments: &[&str],
    make_private: bool,
    parent: Option<Uuid>,
    effects: &mut Effects,
) -> DmsResult<Collection> {
    let mut current = parent;
    let mut leaf = None;
    for segment in segments {
        let name = sanitize_name(segment)?;
        let reusable = store
            .tree()
            .children(current)
            .into_iter()
            .find(|c| c.name == name && (c.owned_by(actor.id) || !c.is_private))
            .cloned();
        let node = match reusable {
            Some(existing) => existing,
            None => {
                let mut request = NewCollection::private(segment.to_string())
                    .with_kind(CollectionType::Folder);
                request.is_private = make_private;
                request.parent = current;
                insert_collection(store, actor, &request, effects)?
            }
        };
        current = Some(node.id);
        leaf = Some(node);
    }
    leaf.ok_or_else(|| DmsError::invalid("folder path has no segments"))
}

impl DmsHub {
    pub fn create_collection(&self, actor: &User, request: NewCollection) -> DmsResult<Collection> {
        authorize(actor, create_operation(request.is_private), Subject::none())?;
        let mut store = self.store().write();
        let mut effects = Effects::default();
        let created = store.transaction(|s| insert_collection(s, actor, &request, &mut effects))?;
        self.finish(&mut store, effects);
        Ok(created)
    }

    /// Create (or reuse) one collection per path segment and return the leaf.
    pub fn create_collections_from_folder_path(
        &self,
        actor: &User,
        path: &str,
        make_private: bool,
        parent: Option<Uuid>,
    ) -> DmsResult<Collection> {
        let segments = path_segments(path);
        if segments.is_empty() {
            return Err(DmsError::invalid("folder path is empty"));
        }
        authorize(actor, create_operation(make_private), Subject::none())?;
        let mut store = self.store().write();
        let mut effects = Effects::default();
        let leaf = store.transaction(|s| {
            insert_folder_path(s, actor, &segments, make_private, parent, &mut effects)
        })?;
        self.finish(&mut store, effects);
        Ok(leaf)
    }

    /// Recreate the directory hierarchy rooted at `path` as nested collections.
    pub fn import_folder(
        &self,
        actor: &User,
        path: &Path,
        copy: bool,
        recursive: bool,
        make_private: bool,
    ) -> DmsResult<FolderImport> {
        if !copy {
            return Err(DmsError::Unsupported {
                operation: "import without copying files".to_string(),
                code: IMPORT_WITHOUT_COPY,
            });
        }
        if !recursive {
            return Err(DmsError::Unsupported {
                operation: "non recursive folder import".to_string(),
                code: IMPORT_NOT_RECURSIVE,
            });
        }
        if !path.is_dir() {
            return Err(DmsError::NotFound(format!("folder {}", path.display())));
        }
        authorize(actor, create_operation(make_private), Subject::none())?;

        let base = path.parent().unwrap_or(path);
        let mut relative_paths = Vec::new();
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let relative = entry.path().strip_prefix(base).unwrap_or(entry.path());
            let joined = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            relative_paths.push(joined);
        }

        let mut store = self.store().write();
        let mut effects = Effects::default();
        let root = store.transaction(|s| {
            let mut root = None;
            for relative in &relative_paths {
                let segments = path_segments(relative);
                let leaf = insert_folder_path(s, actor, &segments, make_private, None, &mut effects)?;
                root.get_or_insert(leaf);
            }
            root.ok_or_else(|| DmsError::invalid("folder has no name"))
        })?;
        self.finish(&mut store, effects);
        tracing::info!(root = %root.id, directories = relative_paths.len(), "folder imported");
        Ok(FolderImport {
            root,
            directories: relative_paths.len(),
        })
    }

    pub fn update_collection(
        &self,
        actor: &User,
        id: Uuid,
        update: CollectionUpdate,
    ) -> DmsResult<Collection> {
        let mut store = self.store().write();
        let current = require_live(store.tree(), id)?.clone();
        authorize(actor, Operation::EditCollection, Subject::from(&current))?;

        let new_name = match update.name.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(sanitize_name(raw)?),
            _ => None,
        };
        if let Some(name) = &new_name {
            let collides = store
                .tree()
                .siblings(id)
                .iter()
                .any(|s| s.owned_by(actor.id) && &s.name == name);
            if collides && name != &current.name {
                return Err(DmsError::collision(
                    "A collection with the same name already exists at this level",
                    COLLISION_ON_RENAME,
                ));
            }
        }

        let rename = new_name.filter(|n| n != &current.name);
        let recolor = update.color.filter(|c| c != &current.color);
        if rename.is_none() && recolor.is_none() {
            return Ok(current);
        }

        let mut effects = Effects::default();
        let updated = store.transaction(|s| {
            let node = s.tree_mut().require_mut(id)?;
            if let Some(name) = rename {
                node.name = name;
            }
            if let Some(color) = recolor {
                node.color = color;
            }
            node.updated_at = chrono::Utc::now();
            Ok(node.clone())
        })?;
        effects.forget_listing_of(&updated);
        effects.emit(Event::Updated { id });
        self.finish(&mut store, effects);
        Ok(updated)
    }

    pub fn can_copy_or_move_collection(
        &self,
        actor: &User,
        id: Uuid,
        under: Option<Uuid>,
    ) -> DmsResult<bool> {
        let store = self.store().read();
        let collection = store.tree().require(id)?;
        Ok(find_named(store.tree(), under, actor.id, &collection.name, None).is_none())
    }
}
