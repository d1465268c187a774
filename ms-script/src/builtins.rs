#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum BuiltinFunction {
    Out,
    Len,
    Keys,
    Str,
    Num,
    Log,
    JsonParse,
    JsonStringify,
}

impl BuiltinFunction {
    pub(crate) const ALL: [BuiltinFunction; 8] = [
        BuiltinFunction::Out,
        BuiltinFunction::Len,
        BuiltinFunction::Keys,
        BuiltinFunction::Str,
        BuiltinFunction::Num,
        BuiltinFunction::Log,
        BuiltinFunction::JsonParse,
        BuiltinFunction::JsonStringify,
    ];

    pub(crate) fn name(self) -> &'static str {
        match self {
            BuiltinFunction::Out => "out",
            BuiltinFunction::Len => "len",
            BuiltinFunction::Keys => "keys",
            BuiltinFunction::Str => "str",
            BuiltinFunction::Num => "num",
            BuiltinFunction::Log => "log",
            BuiltinFunction::JsonParse => "JSON.parse",
            BuiltinFunction::JsonStringify => "JSON.stringify",
        }
    }

    pub(crate) fn arity(self) -> u8 {
        match self {
            BuiltinFunction::Out
            | BuiltinFunction::Len
            | BuiltinFunction::Keys
            | BuiltinFunction::Str
            | BuiltinFunction::Num
            | BuiltinFunction::Log
            | BuiltinFunction::JsonParse
            | BuiltinFunction::JsonStringify => 1,
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }
}

/// Global names a script may never reference, whatever capabilities it holds.
pub(crate) const DENIED_GLOBALS: &[&str] = &[
    "exit",
    "quit",
    "load",
    "loadWithNewGlobal",
    "require",
    "eval",
    "Java",
    "Packages",
    "fetch",
    "import",
];

pub(crate) fn is_denied_global(name: &str) -> bool {
    DENIED_GLOBALS.contains(&name)
}
