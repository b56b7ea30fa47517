/// Postgres-style object identifier, reported in `RowDescription`.
pub type Oid = u32;

/// Well known type oids reported by netezza in `RowDescription`.
pub mod oid {
    use super::Oid;

    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const CHAR: Oid = 18;
    pub const NAME: Oid = 19;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    pub const JSON: Oid = 114;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    /// Seconds since unix epoch.
    pub const ABSTIME: Oid = 702;
    pub const UNKNOWN: Oid = 705;
    pub const BPCHAR: Oid = 1042;
    pub const VARCHAR: Oid = 1043;
    pub const DATE: Oid = 1082;
    pub const TIME: Oid = 1083;
    pub const TIMESTAMP: Oid = 1114;
    pub const TIMESTAMPTZ: Oid = 1184;
    pub const INTERVAL: Oid = 1186;
    pub const TIMETZ: Oid = 1266;
    pub const NUMERIC: Oid = 1700;
    pub const UUID: Oid = 2950;
    pub const BYTEINT: Oid = 2500;
    pub const NCHAR: Oid = 2522;
    pub const NVARCHAR: Oid = 2530;
    pub const VARBINARY: Oid = 2568;
    pub const ST_GEOMETRY: Oid = 2569;
    pub const JSONB: Oid = 3802;
}

macro_rules! nz_types {
    ($($(#[$doc:meta])* $name:ident = $code:literal,)*) => {
        /// Data type code reported in the DBOS tuple descriptor.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum NzType {
            $($(#[$doc])* $name,)*
            /// Code not known to this driver, value is returned as raw bytes.
            Other(i32),
        }

        impl NzType {
            pub fn from_code(code: i32) -> NzType {
                match code {
                    $($code => Self::$name,)*
                    other => Self::Other(other),
                }
            }

            pub fn code(self) -> i32 {
                match self {
                    $(Self::$name => $code,)*
                    Self::Other(other) => other,
                }
            }
        }
    };
}

nz_types! {
    RecAddr = 1,
    Double = 2,
    Int = 3,
    Float = 4,
    Money = 5,
    /// Days since 2000-01-01.
    Date = 6,
    Numeric = 7,
    /// Microseconds of day.
    Time = 8,
    /// Microseconds since 2000-01-01.
    Timestamp = 9,
    /// Microseconds and whole months.
    Interval = 10,
    /// Microseconds of day and zone offset in seconds.
    TimeTz = 11,
    Bool = 12,
    Int1 = 13,
    Binary = 14,
    Char = 15,
    VarChar = 16,
    Text = 17,
    Unknown = 18,
    Int2 = 19,
    Int8 = 20,
    VarFixedChar = 21,
    Geometry = 22,
    VarBinary = 23,
    Blob = 24,
    NChar = 25,
    NVarChar = 26,
    NText = 27,
    Json = 30,
    Jsonb = 31,
    Jsonpath = 32,
    /// `INT4` field carrying abstime seconds since unix epoch.
    AbsTime = 39,
}

impl NzType {
    /// Returns `true` for types whose storage is a length prefixed varying field.
    pub fn is_varying(self) -> bool {
        matches!(
            self,
            Self::VarChar
                | Self::VarFixedChar
                | Self::NVarChar
                | Self::Text
                | Self::NText
                | Self::VarBinary
                | Self::Geometry
                | Self::Blob
                | Self::Json
                | Self::Jsonb
                | Self::Jsonpath
        )
    }
}
