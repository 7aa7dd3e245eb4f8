/// Generates a non-exhaustive enum mapping Rust variants to AMI header names.
///
/// Produces the enum, `as_str()`, an `ALL` slice, `Display`, `AsRef<str>` and a
/// case-sensitive `FromStr` (AMI header names are matched exactly on the wire).
/// The parse error type is declared by the caller.
///
/// ```ignore
/// define_header_enum! {
///     error_type: ParseMyHeaderError,
///     /// Doc comment for the enum.
///     pub enum MyHeader {
///         Foo => "Foo",
///         BarBaz => "Bar-Baz",
///     }
/// }
/// ```
macro_rules! define_header_enum {
    (
        error_type: $Err:ident,
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        $vis enum $Name {
            $(
                $(#[$var_meta])*
                $variant,
            )+
        }

        impl $Name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$Name] = &[ $( $Name::$variant, )+ ];

            /// Header name as it appears on the wire.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $Name::$variant => $wire, )+
                }
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $wire => Ok($Name::$variant), )+
                    _ => Err($Err(s.to_string())),
                }
            }
        }
    };
}
