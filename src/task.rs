//! Callable task handles.
//!
//! A [`Task`] is a two-to-three-word value naming either a plain
//! function or a method bound to a `'static` receiver. A
//! default-constructed `Task` names nothing and is reported by
//! [`Task::is_callable`] as such; the dispatcher treats dispatching one
//! as a no-op. Equality is structural: two handles are equal when they
//! would invoke the same function, or the same method on the same
//! receiver.

use core::fmt;
use core::mem;

/// A callable handle: nothing, a plain function, or a bound method.
#[derive(Clone, Copy)]
pub struct Task {
    kind: Kind,
}

#[derive(Clone, Copy, Default)]
enum Kind {
    #[default]
    None,
    Function(fn()),
    Bound {
        object: *const (),
        method: *const (),
        invoke: unsafe fn(*const (), *const ()),
    },
}

impl Task {
    /// Handle to a plain function.
    pub const fn function(f: fn()) -> Self {
        Self {
            kind: Kind::Function(f),
        }
    }

    /// Handle to `method` bound to `object`.
    ///
    /// The receiver must be `'static`; the handle stores a raw pointer
    /// to it and may be invoked arbitrarily late.
    pub fn bound<T>(method: fn(&T), object: &'static T) -> Self {
        unsafe fn trampoline<T>(object: *const (), method: *const ()) {
            // SAFETY: `object` came from a `&'static T` and `method`
            // from a `fn(&T)`, both erased by `Task::bound::<T>` with
            // the same `T` that instantiated this trampoline.
            let method = unsafe { mem::transmute::<*const (), fn(&T)>(method) };
            method(unsafe { &*object.cast::<T>() })
        }

        Self {
            kind: Kind::Bound {
                object: (object as *const T).cast(),
                method: method as *const (),
                invoke: trampoline::<T>,
            },
        }
    }

    /// True iff invoking this handle would actually run something.
    pub const fn is_callable(&self) -> bool {
        !matches!(self.kind, Kind::None)
    }

    /// Invoke the underlying function or bound method. No-op for a
    /// default-constructed handle.
    pub fn call(&self) {
        match self.kind {
            Kind::None => {}
            Kind::Function(f) => f(),
            Kind::Bound {
                object,
                method,
                invoke,
            } => {
                // SAFETY: the triple was built by `Task::bound`, which
                // pairs `invoke` with pointers of the matching type.
                unsafe { invoke(object, method) }
            }
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Self { kind: Kind::None }
    }
}

impl From<fn()> for Task {
    fn from(f: fn()) -> Self {
        Self::function(f)
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        match (self.kind, other.kind) {
            (Kind::None, Kind::None) => true,
            (Kind::Function(a), Kind::Function(b)) => a as usize == b as usize,
            (
                Kind::Bound {
                    object: ao,
                    method: am,
                    ..
                },
                Kind::Bound {
                    object: bo,
                    method: bm,
                    ..
                },
            ) => ao == bo && am == bm,
            _ => false,
        }
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::None => write!(f, "Task::none"),
            Kind::Function(func) => write!(f, "Task::function({:#x})", func as usize),
            Kind::Bound { object, method, .. } => {
                write!(f, "Task::bound({:p}, {:p})", method, object)
            }
        }
    }
}
