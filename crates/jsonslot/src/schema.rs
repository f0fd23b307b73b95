//! Destination type model.
//!
//! A destination is any type implementing [`Record`], usually through the
//! [`record!`](crate::record) macro. A record describes itself once through
//! [`Record::schema`] (wire names and value kinds, in declaration order) and
//! exposes each field by position through [`Record::field_mut`], which hands
//! out a typed [`FieldMut`] view the decoder writes through.
//!
//! Field types implement [`Field`]; list and map element types additionally
//! implement [`Element`]. Both are implemented here for the supported std
//! types, and by the macro for every record.

use core::{any::TypeId, fmt, hash::BuildHasher};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::{cache::FieldMap, number::Number};

/// Value kind of a list or map element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// `String`.
    String,
    /// Any primitive integer.
    Integer,
    /// `f32` or `f64`.
    Float,
    /// `bool`.
    Boolean,
    /// A nested [`Record`].
    Record,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementKind::String => "string",
            ElementKind::Integer => "integer",
            ElementKind::Float => "float",
            ElementKind::Boolean => "boolean",
            ElementKind::Record => "record",
        })
    }
}

/// Declared value kind of a destination field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// `String`.
    String,
    /// Any primitive integer.
    Integer,
    /// `f32` or `f64`.
    Float,
    /// `bool`.
    Boolean,
    /// `Vec<T>` of an [`Element`] type.
    List(ElementKind),
    /// A nested [`Record`].
    Record,
    /// `BTreeMap<String, V>` or `HashMap<String, V>` of an [`Element`] type.
    Map(ElementKind),
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::String => f.write_str("string"),
            Kind::Integer => f.write_str("integer"),
            Kind::Float => f.write_str("float"),
            Kind::Boolean => f.write_str("boolean"),
            Kind::List(element) => write!(f, "list of {element}"),
            Kind::Record => f.write_str("record"),
            Kind::Map(element) => write!(f, "map of {element}"),
        }
    }
}

/// One declared field: its wire name and value kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Name as it appears in the JSON document.
    pub name: &'static str,
    /// Declared kind.
    pub kind: Kind,
    /// Whether `null` clears the field (`Option<T>`).
    pub nullable: bool,
}

impl FieldDef {
    /// Describes a field of type `T` named `name` on the wire.
    #[must_use]
    pub const fn of<T: Field>(name: &'static str) -> Self {
        Self {
            name,
            kind: T::KIND,
            nullable: T::NULLABLE,
        }
    }
}

/// The declared shape of a record type.
///
/// Field positions in `fields` are the indices accepted by
/// [`Record::field_mut`].
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    /// Rust type name, for diagnostics.
    pub type_name: &'static str,
    /// Fields in declaration order.
    pub fields: &'static [FieldDef],
}

impl Schema {
    /// Creates a schema.
    #[must_use]
    pub const fn new(type_name: &'static str, fields: &'static [FieldDef]) -> Self {
        Self { type_name, fields }
    }
}

/// Why a value could not be stored into a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    /// The value has a different kind than the slot.
    Mismatch,
    /// The number does not fit the slot's integer type.
    OutOfRange,
}

/// A complete scalar value read from the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar<'a> {
    /// String contents with escapes decoded.
    String(&'a str),
    /// A number.
    Number(Number),
    /// `true` or `false`.
    Boolean(bool),
}

/// A decode destination.
///
/// Implement it with the [`record!`](crate::record) macro. Hand-written
/// implementations must keep `field_mut` consistent with `schema`: the field
/// at position `i` of the schema is returned for index `i`, with a view of
/// the declared kind.
pub trait Record: 'static {
    /// The declared fields of this type.
    fn schema() -> Schema
    where
        Self: Sized;

    /// Identity of the concrete type, used to key field-map caches.
    fn type_key(&self) -> TypeId;

    /// The cached wire-name lookup table for this type.
    fn field_map(&self) -> Arc<FieldMap>;

    /// A typed view of the field at `index`, or `None` past the last field.
    fn field_mut(&mut self, index: usize) -> Option<FieldMut<'_>>;
}

/// A typed mutable view of one destination field.
pub enum FieldMut<'a> {
    /// A string field.
    String(&'a mut String),
    /// An integer field.
    Integer(&'a mut dyn IntegerSlot),
    /// A floating-point field.
    Float(&'a mut dyn FloatSlot),
    /// A boolean field.
    Boolean(&'a mut bool),
    /// A list field.
    List(&'a mut dyn ListSlot),
    /// A nested record.
    Record(&'a mut dyn Record),
    /// A string-keyed map.
    Map(&'a mut dyn MapSlot),
    /// An `Option<T>` wrapping any of the above.
    Optional(&'a mut dyn OptionalSlot),
}

impl<'a> FieldMut<'a> {
    /// Fills optional wrappers with a default value and returns the inner
    /// view.
    #[must_use]
    pub fn fill_optional(self) -> FieldMut<'a> {
        let mut field = self;
        while let FieldMut::Optional(slot) = field {
            field = slot.fill();
        }
        field
    }

    /// Stores a scalar, replacing the previous value. A rejected value
    /// leaves the field untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`Reject`] if the value's kind does not match this field, or
    /// if a number is out of range for an integer field.
    pub fn assign(self, value: Scalar<'_>) -> Result<(), Reject> {
        match (self, value) {
            (FieldMut::Optional(slot), value) => slot.assign(value),
            (FieldMut::String(field), Scalar::String(s)) => {
                field.clear();
                field.push_str(s);
                Ok(())
            }
            (FieldMut::Integer(field), Scalar::Number(n)) => field.store(&n),
            (FieldMut::Float(field), Scalar::Number(n)) => {
                field.store(&n);
                Ok(())
            }
            (FieldMut::Boolean(field), Scalar::Boolean(b)) => {
                *field = b;
                Ok(())
            }
            _ => Err(Reject::Mismatch),
        }
    }

    /// Applies a `null`: optional fields are cleared, others are untouched.
    pub fn assign_null(self) {
        if let FieldMut::Optional(slot) = self {
            slot.clear();
        }
    }
}

/// Integer destinations.
pub trait IntegerSlot {
    /// Stores `number`, which must be an in-range integer.
    ///
    /// # Errors
    ///
    /// [`Reject::Mismatch`] for fractional numbers, [`Reject::OutOfRange`]
    /// when the value does not fit.
    fn store(&mut self, number: &Number) -> Result<(), Reject>;
}

/// Floating-point destinations.
pub trait FloatSlot {
    /// Stores `number`, rounding as needed.
    fn store(&mut self, number: &Number);
}

/// List destinations (`Vec<T>`).
pub trait ListSlot {
    /// Kind of the elements.
    fn element_kind(&self) -> ElementKind;
    /// Number of elements.
    fn len(&self) -> usize;
    /// Whether there are no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Shortens the list to `len` elements.
    fn truncate(&mut self, len: usize);
    /// Removes the first `count` elements.
    fn remove_leading(&mut self, count: usize);
    /// Appends a scalar element.
    ///
    /// # Errors
    ///
    /// Returns a [`Reject`] if the element type cannot hold `value`.
    fn push_scalar(&mut self, value: Scalar<'_>) -> Result<(), Reject>;
    /// Appends a default record element and returns it, or `None` for
    /// scalar element types.
    fn push_record(&mut self) -> Option<&mut dyn Record>;
    /// The record element at `index`.
    fn record_at(&mut self, index: usize) -> Option<&mut dyn Record>;
}

/// String-keyed map destinations.
pub trait MapSlot {
    /// Kind of the values.
    fn element_kind(&self) -> ElementKind;
    /// Inserts a scalar value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a [`Reject`] if the value type cannot hold `value`.
    fn insert_scalar(&mut self, key: &str, value: Scalar<'_>) -> Result<(), Reject>;
    /// Inserts a default record value and returns it, or `None` for scalar
    /// value types.
    fn insert_record(&mut self, key: &str) -> Option<&mut dyn Record>;
    /// The record value under `key`.
    fn record_at(&mut self, key: &str) -> Option<&mut dyn Record>;
}

/// `Option<T>` destinations.
pub trait OptionalSlot {
    /// Sets the option to `None`.
    fn clear(&mut self);
    /// Stores a scalar into the inner value. A `None` option becomes `Some`
    /// only if the value is accepted.
    ///
    /// # Errors
    ///
    /// Returns a [`Reject`] if the inner type cannot hold `value`.
    fn assign(&mut self, value: Scalar<'_>) -> Result<(), Reject>;
    /// Makes the option `Some`, inserting a default if needed, and returns a
    /// view of the inner value.
    fn fill(&mut self) -> FieldMut<'_>;
}

/// A type that can be a record field.
pub trait Field {
    /// Declared kind.
    const KIND: Kind;
    /// Whether `null` clears the field.
    const NULLABLE: bool = false;
    /// A typed view of this field.
    fn view(&mut self) -> FieldMut<'_>;
}

/// A type that can be a list element or a map value.
pub trait Element: Default + 'static {
    /// Element kind.
    const ELEMENT: ElementKind;

    /// Converts a scalar into an element.
    ///
    /// # Errors
    ///
    /// Returns a [`Reject`] if this type cannot hold `value`.
    fn from_scalar(value: Scalar<'_>) -> Result<Self, Reject>;

    /// The element as a record, for record element types.
    fn as_record(&mut self) -> Option<&mut dyn Record> {
        None
    }
}

impl Field for String {
    const KIND: Kind = Kind::String;

    fn view(&mut self) -> FieldMut<'_> {
        FieldMut::String(self)
    }
}

impl Element for String {
    const ELEMENT: ElementKind = ElementKind::String;

    fn from_scalar(value: Scalar<'_>) -> Result<Self, Reject> {
        match value {
            Scalar::String(s) => Ok(s.to_owned()),
            _ => Err(Reject::Mismatch),
        }
    }
}

impl Field for bool {
    const KIND: Kind = Kind::Boolean;

    fn view(&mut self) -> FieldMut<'_> {
        FieldMut::Boolean(self)
    }
}

impl Element for bool {
    const ELEMENT: ElementKind = ElementKind::Boolean;

    fn from_scalar(value: Scalar<'_>) -> Result<Self, Reject> {
        match value {
            Scalar::Boolean(b) => Ok(b),
            _ => Err(Reject::Mismatch),
        }
    }
}

macro_rules! integer_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntegerSlot for $ty {
                fn store(&mut self, number: &Number) -> Result<(), Reject> {
                    let value = number.to_integer()?;
                    *self = <$ty>::try_from(value).map_err(|_| Reject::OutOfRange)?;
                    Ok(())
                }
            }

            impl Field for $ty {
                const KIND: Kind = Kind::Integer;

                fn view(&mut self) -> FieldMut<'_> {
                    FieldMut::Integer(self)
                }
            }

            impl Element for $ty {
                const ELEMENT: ElementKind = ElementKind::Integer;

                fn from_scalar(value: Scalar<'_>) -> Result<Self, Reject> {
                    match value {
                        Scalar::Number(n) => {
                            let mut out: $ty = 0;
                            IntegerSlot::store(&mut out, &n)?;
                            Ok(out)
                        }
                        _ => Err(Reject::Mismatch),
                    }
                }
            }
        )*
    };
}

integer_field!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FloatSlot for f64 {
    fn store(&mut self, number: &Number) {
        *self = number.to_f64();
    }
}

impl FloatSlot for f32 {
    #[expect(clippy::cast_possible_truncation)]
    fn store(&mut self, number: &Number) {
        *self = number.to_f64() as f32;
    }
}

macro_rules! float_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Field for $ty {
                const KIND: Kind = Kind::Float;

                fn view(&mut self) -> FieldMut<'_> {
                    FieldMut::Float(self)
                }
            }

            impl Element for $ty {
                const ELEMENT: ElementKind = ElementKind::Float;

                fn from_scalar(value: Scalar<'_>) -> Result<Self, Reject> {
                    match value {
                        Scalar::Number(n) => {
                            let mut out: $ty = 0.0;
                            FloatSlot::store(&mut out, &n);
                            Ok(out)
                        }
                        _ => Err(Reject::Mismatch),
                    }
                }
            }
        )*
    };
}

float_field!(f32, f64);

impl<T: Element> ListSlot for Vec<T> {
    fn element_kind(&self) -> ElementKind {
        T::ELEMENT
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn truncate(&mut self, len: usize) {
        Vec::truncate(self, len);
    }

    fn remove_leading(&mut self, count: usize) {
        self.drain(..count.min(Vec::len(self)));
    }

    fn push_scalar(&mut self, value: Scalar<'_>) -> Result<(), Reject> {
        self.push(T::from_scalar(value)?);
        Ok(())
    }

    fn push_record(&mut self) -> Option<&mut dyn Record> {
        if T::ELEMENT != ElementKind::Record {
            return None;
        }
        self.push(T::default());
        self.last_mut().and_then(Element::as_record)
    }

    fn record_at(&mut self, index: usize) -> Option<&mut dyn Record> {
        self.get_mut(index).and_then(Element::as_record)
    }
}

impl<T: Element> Field for Vec<T> {
    const KIND: Kind = Kind::List(T::ELEMENT);

    fn view(&mut self) -> FieldMut<'_> {
        FieldMut::List(self)
    }
}

impl<V: Element> MapSlot for BTreeMap<String, V> {
    fn element_kind(&self) -> ElementKind {
        V::ELEMENT
    }

    fn insert_scalar(&mut self, key: &str, value: Scalar<'_>) -> Result<(), Reject> {
        let value = V::from_scalar(value)?;
        self.insert(key.to_owned(), value);
        Ok(())
    }

    fn insert_record(&mut self, key: &str) -> Option<&mut dyn Record> {
        if V::ELEMENT != ElementKind::Record {
            return None;
        }
        let slot = self.entry(key.to_owned()).or_default();
        *slot = V::default();
        slot.as_record()
    }

    fn record_at(&mut self, key: &str) -> Option<&mut dyn Record> {
        self.get_mut(key).and_then(Element::as_record)
    }
}

impl<V: Element> Field for BTreeMap<String, V> {
    const KIND: Kind = Kind::Map(V::ELEMENT);

    fn view(&mut self) -> FieldMut<'_> {
        FieldMut::Map(self)
    }
}

impl<V: Element, S: BuildHasher + Default + 'static> MapSlot for HashMap<String, V, S> {
    fn element_kind(&self) -> ElementKind {
        V::ELEMENT
    }

    fn insert_scalar(&mut self, key: &str, value: Scalar<'_>) -> Result<(), Reject> {
        let value = V::from_scalar(value)?;
        self.insert(key.to_owned(), value);
        Ok(())
    }

    fn insert_record(&mut self, key: &str) -> Option<&mut dyn Record> {
        if V::ELEMENT != ElementKind::Record {
            return None;
        }
        let slot = self.entry(key.to_owned()).or_default();
        *slot = V::default();
        slot.as_record()
    }

    fn record_at(&mut self, key: &str) -> Option<&mut dyn Record> {
        self.get_mut(key).and_then(Element::as_record)
    }
}

impl<V: Element, S: BuildHasher + Default + 'static> Field for HashMap<String, V, S> {
    const KIND: Kind = Kind::Map(V::ELEMENT);

    fn view(&mut self) -> FieldMut<'_> {
        FieldMut::Map(self)
    }
}

impl<T: Field + Default> OptionalSlot for Option<T> {
    fn clear(&mut self) {
        *self = None;
    }

    fn assign(&mut self, value: Scalar<'_>) -> Result<(), Reject> {
        if let Some(inner) = self {
            return inner.view().assign(value);
        }
        let mut inner = T::default();
        inner.view().assign(value)?;
        *self = Some(inner);
        Ok(())
    }

    fn fill(&mut self) -> FieldMut<'_> {
        self.get_or_insert_with(T::default).view()
    }
}

impl<T: Field + Default + 'static> Field for Option<T> {
    const KIND: Kind = T::KIND;
    const NULLABLE: bool = true;

    fn view(&mut self) -> FieldMut<'_> {
        FieldMut::Optional(self)
    }
}

/// Declares a struct and implements [`Record`], [`Field`] and [`Element`]
/// for it.
///
/// Each field's wire name defaults to its Rust name; append `as "name"` to
/// rename it. Records must implement [`Default`], since list elements and map
/// values are created empty before being decoded into.
///
/// ```rust
/// jsonslot::record! {
///     #[derive(Debug, Default)]
///     pub struct Movie {
///         pub title: String,
///         pub aspect_ratio: f64 as "aspectRatio",
///         pub starring: Vec<String>,
///     }
/// }
///
/// let mut movie = Movie::default();
/// jsonslot::unmarshal(br#"{"title":"Heat","aspectRatio":2.39}"#, &mut movie).unwrap();
/// assert_eq!(movie.title, "Heat");
/// assert_eq!(movie.aspect_ratio, 2.39);
/// ```
#[macro_export]
macro_rules! record {
    (@wire $field:ident) => {
        ::core::stringify!($field)
    };
    (@wire $field:ident $wire:literal) => {
        $wire
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty $(as $wire:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::Record for $name {
            fn schema() -> $crate::Schema {
                const FIELDS: &[$crate::FieldDef] = &[
                    $( $crate::FieldDef::of::<$ty>($crate::record!(@wire $field $($wire)?)), )*
                ];
                $crate::Schema::new(::core::stringify!($name), FIELDS)
            }

            fn type_key(&self) -> ::core::any::TypeId {
                ::core::any::TypeId::of::<Self>()
            }

            fn field_map(&self) -> $crate::__private::Arc<$crate::FieldMap> {
                $crate::cache::resolve::<Self>()
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn field_mut(
                &mut self,
                index: usize,
            ) -> ::core::option::Option<$crate::FieldMut<'_>> {
                let mut position = 0usize;
                $(
                    if index == position {
                        return ::core::option::Option::Some(
                            $crate::Field::view(&mut self.$field),
                        );
                    }
                    position += 1;
                )*
                ::core::option::Option::None
            }
        }

        impl $crate::Field for $name {
            const KIND: $crate::Kind = $crate::Kind::Record;

            fn view(&mut self) -> $crate::FieldMut<'_> {
                $crate::FieldMut::Record(self)
            }
        }

        impl $crate::Element for $name {
            const ELEMENT: $crate::ElementKind = $crate::ElementKind::Record;

            fn from_scalar(
                _value: $crate::Scalar<'_>,
            ) -> ::core::result::Result<Self, $crate::Reject> {
                ::core::result::Result::Err($crate::Reject::Mismatch)
            }

            fn as_record(&mut self) -> ::core::option::Option<&mut dyn $crate::Record> {
                ::core::option::Option::Some(self)
            }
        }
    };
}
