//! The register-type lattice used by the dataflow analyzer.
//!
//! A [`RegisterType`] describes the set of possible runtime types held by a
//! single virtual register at one program point. Values are small and
//! immutable; [`RegisterType::merge`] combines the types flowing in from two
//! control-flow paths and only ever moves *up* the lattice, from
//! [`Category::Unknown`] at the bottom toward [`Category::Conflicted`] at the
//! top. That monotonicity is what guarantees the fixed-point iteration in
//! `dexlift-flow` terminates.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Descriptor used when two unrelated reference types meet.
pub const OBJECT_DESCRIPTOR: &str = "Ljava/lang/Object;";

/// The coarse kind of value a register holds.
///
/// `LongLo`/`LongHi` (and the double pair) model the two halves of a 64-bit
/// value, which occupies two consecutive registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Nothing is known yet. Bottom of the lattice.
    Unknown,
    /// The literal zero constant: either `null` or numeric 0, depending on
    /// how the register is later used.
    Null,
    Boolean,
    Byte,
    Short,
    Char,
    Integer,
    Float,
    LongLo,
    LongHi,
    DoubleLo,
    DoubleHi,
    /// Reference to an allocated but not yet constructed object.
    UninitRef,
    /// The `this` reference inside a constructor, before the chained
    /// constructor call completes.
    UninitThis,
    Reference,
    /// Incompatible types met on converging paths. Top of the lattice.
    Conflicted,
}

impl Category {
    /// Whether a [`Category::Null`] zero constant can flow into this category
    /// without widening past it.
    fn accepts_null(self) -> bool {
        matches!(
            self,
            Category::Boolean
                | Category::Byte
                | Category::Short
                | Category::Char
                | Category::Integer
                | Category::Float
                | Category::Reference
        )
    }
}

/// An immutable lattice value: a category plus, for reference-bearing
/// categories, the type descriptor and (for uninitialized references) the
/// allocation site that produced the value.
///
/// The allocation site makes "same uninitialized reference" an explicit,
/// value-comparable fact rather than a pointer-identity question: two
/// registers alias the same unconstructed object iff their `RegisterType`s
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterType {
    category: Category,
    descriptor: Option<SmolStr>,
    allocation_site: Option<u32>,
}

impl RegisterType {
    pub const fn unknown() -> Self {
        Self::plain(Category::Unknown)
    }

    pub const fn null() -> Self {
        Self::plain(Category::Null)
    }

    pub const fn boolean() -> Self {
        Self::plain(Category::Boolean)
    }

    pub const fn byte() -> Self {
        Self::plain(Category::Byte)
    }

    pub const fn short() -> Self {
        Self::plain(Category::Short)
    }

    pub const fn char() -> Self {
        Self::plain(Category::Char)
    }

    pub const fn integer() -> Self {
        Self::plain(Category::Integer)
    }

    pub const fn float() -> Self {
        Self::plain(Category::Float)
    }

    /// Low half of a 64-bit integer value.
    pub const fn long() -> Self {
        Self::plain(Category::LongLo)
    }

    /// Low half of a 64-bit floating point value.
    pub const fn double() -> Self {
        Self::plain(Category::DoubleLo)
    }

    pub const fn conflicted() -> Self {
        Self::plain(Category::Conflicted)
    }

    pub fn reference(descriptor: impl Into<SmolStr>) -> Self {
        Self {
            category: Category::Reference,
            descriptor: Some(descriptor.into()),
            allocation_site: None,
        }
    }

    /// A freshly allocated, not yet constructed object. `allocation_site` is
    /// the index of the instruction that performed the allocation.
    pub fn uninit_ref(descriptor: impl Into<SmolStr>, allocation_site: u32) -> Self {
        Self {
            category: Category::UninitRef,
            descriptor: Some(descriptor.into()),
            allocation_site: Some(allocation_site),
        }
    }

    pub fn uninit_this(descriptor: impl Into<SmolStr>) -> Self {
        Self {
            category: Category::UninitThis,
            descriptor: Some(descriptor.into()),
            allocation_site: None,
        }
    }

    const fn plain(category: Category) -> Self {
        Self {
            category,
            descriptor: None,
            allocation_site: None,
        }
    }

    /// The lattice value for a field or parameter with the given type
    /// descriptor. Wide types yield the low half; pair it with
    /// [`RegisterType::wide_high_half`] for the adjacent register.
    pub fn from_descriptor(descriptor: &str) -> Option<Self> {
        match *descriptor.as_bytes().first()? {
            b'Z' => Some(Self::boolean()),
            b'B' => Some(Self::byte()),
            b'S' => Some(Self::short()),
            b'C' => Some(Self::char()),
            b'I' => Some(Self::integer()),
            b'F' => Some(Self::float()),
            b'J' => Some(Self::long()),
            b'D' => Some(Self::double()),
            b'L' | b'[' => Some(Self::reference(descriptor)),
            _ => None,
        }
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub fn descriptor(&self) -> Option<&str> {
        self.descriptor.as_deref()
    }

    #[must_use]
    pub fn allocation_site(&self) -> Option<u32> {
        self.allocation_site
    }

    /// Whether this is the low half of a two-register value.
    #[must_use]
    pub fn is_wide_low(&self) -> bool {
        matches!(self.category, Category::LongLo | Category::DoubleLo)
    }

    /// The second register slot of a wide value whose low half is `self`.
    #[must_use]
    pub fn wide_high_half(&self) -> Option<Self> {
        match self.category {
            Category::LongLo => Some(Self::plain(Category::LongHi)),
            Category::DoubleLo => Some(Self::plain(Category::DoubleHi)),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_uninitialized(&self) -> bool {
        matches!(self.category, Category::UninitRef | Category::UninitThis)
    }

    /// The type this value takes once its constructor completes.
    ///
    /// `None` for values that are not uninitialized references.
    #[must_use]
    pub fn initialized(&self) -> Option<Self> {
        if !self.is_uninitialized() {
            return None;
        }
        self.descriptor.clone().map(Self::reference)
    }

    /// Merge two lattice values.
    ///
    /// Commutative, associative, idempotent, and monotonic: the result is
    /// always at least as general as both inputs, and merging can only move a
    /// value a bounded number of steps before it reaches a fixed point or
    /// [`Category::Conflicted`].
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        if self == other {
            return self.clone();
        }
        match (self.category, other.category) {
            (Category::Unknown, _) => other.clone(),
            (_, Category::Unknown) => self.clone(),
            (Category::Conflicted, _) | (_, Category::Conflicted) => Self::conflicted(),
            // Two distinct uninitialized values must never meet; equality
            // (same descriptor and allocation site) was ruled out above.
            (Category::UninitRef | Category::UninitThis, _)
            | (_, Category::UninitRef | Category::UninitThis) => Self::conflicted(),
            (Category::Reference, Category::Reference) => Self::reference(OBJECT_DESCRIPTOR),
            (Category::Null, c) if c.accepts_null() => other.clone(),
            (c, Category::Null) if c.accepts_null() => self.clone(),
            (a, b) => Self::plain(merge_categories(a, b)),
        }
    }
}

/// Primitive widening for non-equal, non-reference categories.
fn merge_categories(a: Category, b: Category) -> Category {
    use Category::{Boolean, Byte, Char, Conflicted, Integer, Short};
    match (a, b) {
        (Boolean, Byte) | (Byte, Boolean) => Byte,
        (Boolean | Byte, Short) | (Short, Boolean | Byte) => Short,
        (Boolean, Char) | (Char, Boolean) => Char,
        // Byte and Short are signed, Char is not; the only common widening
        // is a full 32-bit integer.
        (Byte | Short, Char) | (Char, Byte | Short) => Integer,
        (Boolean | Byte | Short | Char, Integer) | (Integer, Boolean | Byte | Short | Char) => {
            Integer
        }
        _ => Conflicted,
    }
}
