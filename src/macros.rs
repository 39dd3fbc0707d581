/// Defines a transparent newtype over a native status or code type, with named constants.
///
/// The generated type gets `from_raw`/`raw` conversions and a `Debug` impl that prints
/// `$prefix` followed by the constant name, or the raw value in hex if no constant matches.
macro_rules! ffi_enum {
    (
        $( #[$attrs:meta] )*
        $v:vis enum $name:ident: $native:ty as $prefix:literal {
            $(
                $( #[$variant_attrs:meta] )*
                $variant:ident = $value:expr
            ),+
            $(,)?
        }
    ) => {
        $( #[$attrs] )*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        $v struct $name(pub(crate) $native);

        impl $name {
            $(
                $( #[$variant_attrs] )*
                $v const $variant: Self = Self($value);
            )+

            #[inline]
            $v const fn from_raw(raw: $native) -> Self {
                Self(raw)
            }

            #[inline]
            $v const fn raw(self) -> $native {
                self.0
            }

            #[allow(dead_code, unreachable_patterns)]
            fn variant_name(&self) -> Option<&'static str> {
                match self {
                    $(
                        &Self::$variant => Some(stringify!($variant)),
                    )*
                    _ => None,
                }
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self.variant_name() {
                    Some(name) => write!(f, "{}{}", $prefix, name),
                    None => write!(f, "{}({:#x})", stringify!($name), self.0),
                }
            }
        }
    };
}
