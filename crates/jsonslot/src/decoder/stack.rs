//! Bounded stack of open objects.
//!
//! Frame 0 is the top-level destination. Frames never hold references into
//! the destination; each one records the step taken from its parent record
//! instead, and the current write target is located by replaying those steps
//! from the root.
//!
//! Array elements are appended after the list's existing contents and only
//! replace them once the closing `]` arrives; [`Stack::abandon`] drops the
//! staged elements of every open array when a decode fails.

use std::sync::Arc;

use bstr::BString;

use crate::{
    cache::{FieldMap, LocalCache, Slot},
    error::{ErrorKind, Found},
    schema::{ElementKind, FieldMut, Kind, ListSlot, MapSlot, Record, Reject, Scalar},
};

/// How a record frame is reached from the record below it.
#[derive(Debug)]
enum Via {
    Root,
    Field(Slot),
    Element(Slot, usize),
    Entry(Slot, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArrayState {
    slot: Slot,
    /// Length of the list before the array opened.
    base: usize,
    collected: usize,
}

#[derive(Debug)]
enum Frame {
    Record {
        via: Via,
        map: Arc<FieldMap>,
        pending: Option<Slot>,
        array: Option<ArrayState>,
    },
    /// An object decoded into a map field of the record below.
    Map {
        slot: Slot,
        key: String,
        has_key: bool,
    },
}

impl Frame {
    fn record(via: Via, map: Arc<FieldMap>) -> Self {
        Frame::Record {
            via,
            map,
            pending: None,
            array: None,
        }
    }
}

/// What the next token means to the innermost frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Position {
    /// A field name of a record.
    Name,
    /// The value of the selected record field.
    Value(Slot),
    /// The next element of an array field.
    Element(ArrayState),
    /// A key of a map field.
    Key(Slot),
    /// The value under the current key of a map field.
    Entry(Slot),
    /// The top-level object has been closed.
    Closed,
}

impl Position {
    pub(crate) fn expects_value(self) -> bool {
        matches!(
            self,
            Position::Value(_) | Position::Element(_) | Position::Entry(_)
        )
    }
}

#[derive(Debug)]
pub(crate) struct Stack {
    frames: Vec<Frame>,
    max_depth: usize,
    cache: LocalCache,
}

impl Stack {
    pub(crate) fn new(max_depth: usize) -> Self {
        let max_depth = max_depth.max(1);
        Self {
            frames: Vec::with_capacity(max_depth.min(64)),
            max_depth,
            cache: LocalCache::default(),
        }
    }

    /// Opens the top-level object.
    pub(crate) fn begin(&mut self, root: &dyn Record) {
        self.frames.clear();
        let map = self.cache.get(root);
        self.frames.push(Frame::record(Via::Root, map));
    }

    pub(crate) fn reset(&mut self) {
        self.frames.clear();
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn position(&self) -> Position {
        match self.frames.last() {
            None => Position::Closed,
            Some(Frame::Record {
                array: Some(state), ..
            }) => Position::Element(*state),
            Some(Frame::Record {
                pending: Some(slot),
                ..
            }) => Position::Value(*slot),
            Some(Frame::Record { .. }) => Position::Name,
            Some(Frame::Map {
                slot,
                has_key: true,
                ..
            }) => Position::Entry(*slot),
            Some(Frame::Map { slot, .. }) => Position::Key(*slot),
        }
    }

    /// Resolves a field name in the innermost record.
    pub(crate) fn select(&mut self, name: &[u8]) -> Result<(), ErrorKind> {
        match self.frames.last_mut() {
            Some(Frame::Record {
                map,
                pending: pending @ None,
                array: None,
                ..
            }) => {
                let slot = map
                    .get(name)
                    .ok_or_else(|| ErrorKind::UnknownField(BString::from(name)))?;
                *pending = Some(slot);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn set_key(&mut self, name: &str) {
        if let Some(Frame::Map { key, has_key, .. }) = self.frames.last_mut() {
            key.clear();
            key.push_str(name);
            *has_key = true;
        }
    }

    /// Writes a scalar at the current value position. Callers check
    /// [`Position::expects_value`] first; elsewhere this does nothing.
    pub(crate) fn write(
        &mut self,
        root: &mut dyn Record,
        value: Scalar<'_>,
    ) -> Result<(), ErrorKind> {
        let found = found(&value);
        match self.position() {
            Position::Value(slot) => {
                let record = locate(root, &self.frames)?;
                record
                    .field_mut(slot.index)
                    .ok_or(ErrorKind::InconsistentDestination(slot.name))?
                    .assign(value)
                    .map_err(|reject| rejected(slot, found, reject))?;
                self.set_pending(None);
            }
            Position::Element(state) => {
                let list = list_at(locate(root, &self.frames)?, state.slot)?;
                list.push_scalar(value)
                    .map_err(|reject| rejected(state.slot, found, reject))?;
                self.bump_collected();
            }
            Position::Entry(slot) => {
                let parent = self.frames.len() - 1;
                let map = map_at(locate(root, &self.frames[..parent])?, slot)?;
                if let Some(Frame::Map { key, has_key, .. }) = self.frames.last_mut() {
                    map.insert_scalar(key, value)
                        .map_err(|reject| rejected(slot, found, reject))?;
                    *has_key = false;
                }
            }
            Position::Name | Position::Key(_) | Position::Closed => {}
        }
        Ok(())
    }

    /// Applies a `null` at the current value position.
    pub(crate) fn write_null(&mut self, root: &mut dyn Record) -> Result<(), ErrorKind> {
        match self.position() {
            Position::Value(slot) => {
                locate(root, &self.frames)?
                    .field_mut(slot.index)
                    .ok_or(ErrorKind::InconsistentDestination(slot.name))?
                    .assign_null();
                self.set_pending(None);
            }
            Position::Element(state) => {
                return Err(ErrorKind::Mismatch {
                    field: state.slot.name,
                    expected: state.slot.kind,
                    found: Found::Null,
                });
            }
            Position::Entry(_) => {
                if let Some(Frame::Map { has_key, .. }) = self.frames.last_mut() {
                    *has_key = false;
                }
            }
            Position::Name | Position::Key(_) | Position::Closed => {}
        }
        Ok(())
    }

    /// Handles `{` in value position by pushing a frame for the nested
    /// record or map.
    pub(crate) fn open_object(&mut self, root: &mut dyn Record) -> Result<(), ErrorKind> {
        let position = self.position();
        if !position.expects_value() {
            return Err(ErrorKind::UnexpectedCharacter('{'));
        }
        if self.frames.len() >= self.max_depth {
            return Err(ErrorKind::DepthExceeded(self.max_depth));
        }
        let frame = match position {
            Position::Value(slot) => {
                if !matches!(slot.kind, Kind::Record | Kind::Map(_)) {
                    return Err(unsupported(slot, Found::Object));
                }
                let record = locate(root, &self.frames)?;
                let frame = match record.field_mut(slot.index).map(FieldMut::fill_optional) {
                    Some(FieldMut::Record(child)) => {
                        Frame::record(Via::Field(slot), self.cache.get(child))
                    }
                    Some(FieldMut::Map(_)) => Frame::Map {
                        slot,
                        key: String::new(),
                        has_key: false,
                    },
                    Some(_) => return Err(unsupported(slot, Found::Object)),
                    None => return Err(ErrorKind::InconsistentDestination(slot.name)),
                };
                self.set_pending(None);
                frame
            }
            Position::Element(state) => {
                let list = list_at(locate(root, &self.frames)?, state.slot)?;
                if list.element_kind() != ElementKind::Record {
                    return Err(unsupported(state.slot, Found::Object));
                }
                let child = list
                    .push_record()
                    .ok_or(ErrorKind::InconsistentDestination(state.slot.name))?;
                let map = self.cache.get(child);
                let index = list.len().saturating_sub(1);
                self.bump_collected();
                Frame::record(Via::Element(state.slot, index), map)
            }
            Position::Entry(slot) => {
                let key = match self.frames.last_mut() {
                    Some(Frame::Map { key, has_key, .. }) => {
                        *has_key = false;
                        std::mem::take(key)
                    }
                    _ => String::new(),
                };
                let parent = self.frames.len() - 1;
                let map = map_at(locate(root, &self.frames[..parent])?, slot)?;
                if map.element_kind() != ElementKind::Record {
                    return Err(unsupported(slot, Found::Object));
                }
                let child = map
                    .insert_record(&key)
                    .ok_or(ErrorKind::InconsistentDestination(slot.name))?;
                Frame::record(Via::Entry(slot, key), self.cache.get(child))
            }
            Position::Name | Position::Key(_) | Position::Closed => {
                return Err(ErrorKind::UnexpectedCharacter('{'));
            }
        };
        self.frames.push(frame);
        Ok(())
    }

    /// Handles `}`. Returns `true` once the top-level object is closed;
    /// popping an empty stack does nothing.
    pub(crate) fn close_object(&mut self) -> bool {
        self.frames.pop();
        self.frames.is_empty()
    }

    /// Handles `[` by switching the innermost record into array collection
    /// for the selected list field.
    pub(crate) fn open_array(&mut self, root: &mut dyn Record) -> Result<(), ErrorKind> {
        match self.position() {
            Position::Value(slot) => {
                if !matches!(slot.kind, Kind::List(_)) {
                    return Err(unsupported(slot, Found::Array));
                }
                let base = list_at(locate(root, &self.frames)?, slot)?.len();
                if let Some(Frame::Record { pending, array, .. }) = self.frames.last_mut() {
                    *pending = None;
                    *array = Some(ArrayState {
                        slot,
                        base,
                        collected: 0,
                    });
                }
                Ok(())
            }
            Position::Element(ArrayState { slot, .. }) | Position::Entry(slot) => {
                Err(unsupported(slot, Found::Array))
            }
            Position::Name | Position::Key(_) | Position::Closed => {
                Err(ErrorKind::UnexpectedCharacter('['))
            }
        }
    }

    /// Handles `]`. Collected elements replace the previous contents; an
    /// empty array leaves the list as it was.
    pub(crate) fn close_array(&mut self, root: &mut dyn Record) -> Result<(), ErrorKind> {
        let staged = match self.frames.last_mut() {
            Some(Frame::Record { array, .. }) => array.take().filter(|state| state.collected > 0),
            _ => None,
        };
        if let Some(state) = staged {
            list_at(locate(root, &self.frames)?, state.slot)?.remove_leading(state.base);
        }
        Ok(())
    }

    /// Drops the staged elements of every open array, innermost first, so
    /// that lists whose array never closed keep their previous contents.
    pub(crate) fn abandon(&mut self, root: &mut dyn Record) {
        for depth in (1..=self.frames.len()).rev() {
            let frames = &self.frames[..depth];
            let Some(Frame::Record {
                array: Some(state), ..
            }) = frames.last()
            else {
                continue;
            };
            if let Ok(list) = locate(root, frames).and_then(|record| list_at(record, state.slot)) {
                list.truncate(state.base);
            }
        }
        self.frames.clear();
    }

    fn set_pending(&mut self, slot: Option<Slot>) {
        if let Some(Frame::Record { pending, .. }) = self.frames.last_mut() {
            *pending = slot;
        }
    }

    fn bump_collected(&mut self) {
        if let Some(Frame::Record {
            array: Some(state), ..
        }) = self.frames.last_mut()
        {
            state.collected += 1;
        }
    }
}

/// Replays the steps of every record frame in `frames`, returning the
/// innermost record.
fn locate<'r>(
    root: &'r mut dyn Record,
    frames: &[Frame],
) -> Result<&'r mut dyn Record, ErrorKind> {
    let mut current = root;
    for frame in frames {
        if let Frame::Record { via, .. } = frame {
            current = descend(current, via)?;
        }
    }
    Ok(current)
}

fn descend<'r>(record: &'r mut dyn Record, via: &Via) -> Result<&'r mut dyn Record, ErrorKind> {
    let slot = match via {
        Via::Root => return Ok(record),
        Via::Field(slot) | Via::Element(slot, _) | Via::Entry(slot, _) => *slot,
    };
    let child = match (record.field_mut(slot.index).map(FieldMut::fill_optional), via) {
        (Some(FieldMut::Record(child)), Via::Field(_)) => Some(child),
        (Some(FieldMut::List(list)), Via::Element(_, index)) => list.record_at(*index),
        (Some(FieldMut::Map(map)), Via::Entry(_, key)) => map.record_at(key),
        _ => None,
    };
    child.ok_or(ErrorKind::InconsistentDestination(slot.name))
}

fn list_at(record: &mut dyn Record, slot: Slot) -> Result<&mut dyn ListSlot, ErrorKind> {
    match record.field_mut(slot.index).map(FieldMut::fill_optional) {
        Some(FieldMut::List(list)) => Ok(list),
        _ => Err(ErrorKind::InconsistentDestination(slot.name)),
    }
}

fn map_at(record: &mut dyn Record, slot: Slot) -> Result<&mut dyn MapSlot, ErrorKind> {
    match record.field_mut(slot.index).map(FieldMut::fill_optional) {
        Some(FieldMut::Map(map)) => Ok(map),
        _ => Err(ErrorKind::InconsistentDestination(slot.name)),
    }
}

fn found(value: &Scalar<'_>) -> Found {
    match value {
        Scalar::String(_) => Found::String,
        Scalar::Number(n) if n.is_float() => Found::Float,
        Scalar::Number(_) => Found::Integer,
        Scalar::Boolean(_) => Found::Boolean,
    }
}

fn rejected(slot: Slot, found: Found, reject: Reject) -> ErrorKind {
    match reject {
        Reject::Mismatch => ErrorKind::Mismatch {
            field: slot.name,
            expected: slot.kind,
            found,
        },
        Reject::OutOfRange => ErrorKind::NumberOutOfRange(slot.name),
    }
}

fn unsupported(slot: Slot, found: Found) -> ErrorKind {
    ErrorKind::Unsupported {
        field: slot.name,
        found,
    }
}
