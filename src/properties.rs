//! Custom correlation properties, carried in the `Correlation-Context`
//! header as `k1=v1, k2=v2`.

const BANNED_CHARACTERS: [char; 2] = [',', '='];
const HEADER_SEPARATOR: &str = ", ";

/// Ordered key/value bag attached to a request.
///
/// Keys are unique. Entries keep their insertion order when serialized, and
/// pairs merged in from a header go in front of the ones already present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationProperties {
    props: Vec<(String, String)>,
}

impl CorrelationProperties {
    pub fn new(header: Option<&str>) -> Self {
        let mut properties = Self::default();
        properties.add_header_data(header);
        properties
    }

    /// Parses `header` and puts its pairs ahead of the existing ones.
    pub fn add_header_data(&mut self, header: Option<&str>) {
        let mut parsed: Vec<(String, String)> = Vec::new();
        for (key, value) in header.into_iter().flat_map(parse_header) {
            if !parsed.iter().any(|(k, _)| *k == key) {
                parsed.push((key, value));
            }
        }

        self.props.retain(|(key, _)| !parsed.iter().any(|(k, _)| k == key));
        parsed.append(&mut self.props);
        self.props = parsed;
    }

    /// Value stored under `key`, or an empty string.
    pub fn get_property(&self, key: &str) -> &str {
        self.props
            .iter()
            .find(|(k, _)| k == key)
            .map_or("", |(_, v)| v.as_str())
    }

    /// Inserts or replaces `key`. Keys and values containing `,` or `=` would
    /// corrupt the header and are dropped.
    // TODO: leave properties received from upstream untouched and only allow
    // writes to locally added keys.
    pub fn set_property(&mut self, key: &str, value: &str) {
        if key.contains(BANNED_CHARACTERS) || value.contains(BANNED_CHARACTERS) {
            tracing::warn!(
                %key,
                %value,
                "correlation context property keys and values must not contain ',' or '='"
            );
            return;
        }

        match self.props.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_owned(),
            None => self.props.push((key.to_owned(), value.to_owned())),
        }
    }

    pub fn serialize_to_header(&self) -> String {
        self.props
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(HEADER_SEPARATOR)
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn parse_header(header: &str) -> impl Iterator<Item = (String, String)> + '_ {
    header.split(',').filter_map(|pair| {
        // `k=a=b` keeps `a`; stored values never contain `=`.
        let mut parts = pair.split('=');
        let (key, value) = (parts.next()?, parts.next()?);
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some((key.to_owned(), value.trim().to_owned()))
    })
}
