//! Macros for ergonomic state declaration.

/// Generate a [`State`](crate::State) implementation for a fieldless enum.
///
/// # Example
///
/// ```rust
/// use turnstile::{state_enum, Machine};
///
/// state_enum! {
///     pub enum Lifecycle {
///         Ready,
///         Running,
///         Finished,
///     }
/// }
///
/// let machine = Machine::with_initial(Lifecycle::Ready);
/// machine.add_transition(Lifecycle::Ready, Lifecycle::Running);
/// assert!(machine.transition(Lifecycle::Running).unwrap());
/// ```
#[macro_export]
macro_rules! state_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $crate::State for $name {
            fn name(&self) -> &str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::State;

    state_enum! {
        enum TestState {
            Initial,
            Processing,
            Complete,
        }
    }

    #[test]
    fn state_enum_macro_generates_names() {
        assert_eq!(TestState::Initial.name(), "Initial");
        assert_eq!(TestState::Processing.name(), "Processing");
        assert_eq!(TestState::Complete.name(), "Complete");
    }

    #[test]
    fn state_enum_supports_visibility_and_attributes() {
        state_enum! {
            /// States of a toggle.
            pub enum Toggle {
                On,
                Off,
            }
        }

        assert_eq!(Toggle::On.name(), "On");
        assert_eq!(Toggle::Off.name(), "Off");
    }
}
