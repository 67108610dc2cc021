//! Connection character sets.
use encoding_rs::*;
use std::borrow::Cow;

/// Character set names accepted by `lc_ctype` and their decoder.
static CHARSETS: &[(&str, &Encoding)] = &[
    ("UTF8", &UTF_8_INIT),
    ("UNICODE_FSS", &UTF_8_INIT),
    ("NONE", &UTF_8_INIT),
    ("ASCII", &UTF_8_INIT),
    ("OCTETS", &UTF_8_INIT),
    ("WIN1250", &WINDOWS_1250_INIT),
    ("WIN1251", &WINDOWS_1251_INIT),
    ("WIN1252", &WINDOWS_1252_INIT),
    ("WIN1253", &WINDOWS_1253_INIT),
    ("WIN1254", &WINDOWS_1254_INIT),
    ("WIN1255", &WINDOWS_1255_INIT),
    ("WIN1256", &WINDOWS_1256_INIT),
    ("WIN1257", &WINDOWS_1257_INIT),
    ("WIN1258", &WINDOWS_1258_INIT),
    ("ISO8859_1", &WINDOWS_1252_INIT),
    ("ISO8859_2", &ISO_8859_2_INIT),
    ("ISO8859_3", &ISO_8859_3_INIT),
    ("ISO8859_4", &ISO_8859_4_INIT),
    ("ISO8859_5", &ISO_8859_5_INIT),
    ("ISO8859_6", &ISO_8859_6_INIT),
    ("ISO8859_7", &ISO_8859_7_INIT),
    ("ISO8859_8", &ISO_8859_8_INIT),
    ("ISO8859_9", &WINDOWS_1254_INIT),
    ("ISO8859_13", &ISO_8859_13_INIT),
    ("KOI8R", &KOI8_R_INIT),
    ("KOI8U", &KOI8_U_INIT),
    ("DOS866", &IBM866_INIT),
    ("SJIS_0208", &SHIFT_JIS_INIT),
    ("CP943C", &SHIFT_JIS_INIT),
    ("EUCJ_0208", &EUC_JP_INIT),
    ("BIG_5", &BIG5_INIT),
    ("KSC_5601", &EUC_KR_INIT),
    ("GBK", &GBK_INIT),
    ("GB_2312", &GBK_INIT),
    ("GB18030", &GB18030_INIT),
];

/// A character set used to decode text columns and encode text parameters.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset {
    name: &'static str,
    encoding: &'static Encoding,
}

impl Charset {
    pub const UTF8: Charset = Charset { name: "UTF8", encoding: &UTF_8_INIT };

    /// Case insensitive lookup by server name.
    pub fn lookup(name: &str) -> Option<Charset> {
        CHARSETS
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(name, encoding)| Charset { name, encoding })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Decode text, malformed sequences are replaced.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        self.encoding.decode_without_bom_handling(bytes).0
    }

    /// Encode text, unmappable characters become numeric character references.
    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        self.encoding.encode(text).0
    }
}

impl Default for Charset {
    fn default() -> Self {
        Charset::UTF8
    }
}

impl std::fmt::Debug for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Charset").field(&self.name).finish()
    }
}
