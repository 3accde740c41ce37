use crate::drive::RemoteFileRecord;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Substrings marking a file as the franchise-wide certification report
static FRANCHISE_MARKERS: [&str; 2] = ["CertPercent", "Franchise"];

/// Substring marking a file as a per-store report
static STORE_REPORT_MARKER: &str = "MDCReport";

static STORE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{3,4}").expect("store number regex should be valid"));

/// The kind of report a remote file holds, derived from its name.  Only the
/// most recently modified file of each category is downloaded.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) enum Category {
    /// The franchise dashboard
    Franchise,

    /// A store report for the store with the given number
    Store(String),

    /// A store report whose name carries no store number
    UnknownStore,

    /// Anything else
    Other,
}

impl Category {
    /// Determine the category of the file named `name` by trying each of
    /// [`RULES`] in order
    pub(crate) fn classify(name: &str) -> Category {
        RULES
            .iter()
            .find(|rule| (rule.matches)(name))
            .map_or(Category::Other, |rule| (rule.category)(name))
    }

    /// The name under which the file `record` of this category is saved.
    ///
    /// Franchise and numbered store reports are renamed after their kind and
    /// modification date so that successive versions replace each other;
    /// everything else keeps its remote name.
    pub(crate) fn local_filename(&self, record: &RemoteFileRecord) -> String {
        match self {
            Category::Franchise => {
                format!("FranchiseDashboard_{}.xlsx", record.modified_date())
            }
            Category::Store(number) => {
                format!("MDCReport_Store{number}_{}.xlsx", record.modified_date())
            }
            Category::UnknownStore | Category::Other => record.name.clone(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Franchise => write!(f, "franchise"),
            Category::Store(number) => write!(f, "store_{number}"),
            Category::UnknownStore => write!(f, "unknown_store"),
            Category::Other => write!(f, "other"),
        }
    }
}

/// A classification rule: a predicate on file names paired with the
/// constructor of the category assigned to names it accepts
#[derive(Clone, Copy, Debug)]
pub(crate) struct Rule {
    pub(crate) matches: fn(&str) -> bool,
    pub(crate) category: fn(&str) -> Category,
}

/// Classification rules in priority order.  The first rule whose predicate
/// accepts a name decides its category, so a name that is both a franchise
/// and a store report is a franchise report.
pub(crate) static RULES: [Rule; 3] = [
    Rule {
        matches: is_franchise_report,
        category: franchise,
    },
    Rule {
        matches: is_store_report,
        category: store,
    },
    Rule {
        matches: any,
        category: other,
    },
];

fn is_franchise_report(name: &str) -> bool {
    FRANCHISE_MARKERS.iter().any(|m| name.contains(m))
}

fn is_store_report(name: &str) -> bool {
    name.contains(STORE_REPORT_MARKER)
}

fn any(_: &str) -> bool {
    true
}

fn franchise(_: &str) -> Category {
    Category::Franchise
}

// The store number is the first run of three or four digits anywhere in the
// name (a longer run yields its first four digits).
fn store(name: &str) -> Category {
    match STORE_NUMBER.find(name) {
        Some(m) => Category::Store(m.as_str().to_owned()),
        None => Category::UnknownStore,
    }
}

fn other(_: &str) -> Category {
    Category::Other
}

/// The file retained for each category during a sync pass, in the order the
/// categories were first seen
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct CategoryMap {
    entries: Vec<(Category, RemoteFileRecord)>,
}

impl CategoryMap {
    pub(crate) fn new() -> CategoryMap {
        CategoryMap::default()
    }

    /// Record `record` as the file for `category` unless the category
    /// already has one.  Returns `true` if the record was inserted.
    pub(crate) fn insert_if_absent(&mut self, category: Category, record: RemoteFileRecord) -> bool {
        if self.get(&category).is_some() {
            false
        } else {
            self.entries.push((category, record));
            true
        }
    }

    pub(crate) fn get(&self, category: &Category) -> Option<&RemoteFileRecord> {
        self.entries
            .iter()
            .find_map(|(c, r)| (c == category).then_some(r))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, (Category, RemoteFileRecord)> {
        self.entries.iter()
    }
}

impl IntoIterator for CategoryMap {
    type Item = (Category, RemoteFileRecord);
    type IntoIter = std::vec::IntoIter<(Category, RemoteFileRecord)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Keep only the first record of each category.
///
/// `records` must be sorted by modification time, most recent first (as
/// returned by [`DriveClient::list_candidate_files()`]), in which case the
/// record kept for each category is the most recently modified one.  Later
/// records of an already-seen category are discarded.
///
/// [`DriveClient::list_candidate_files()`]: crate::drive::DriveClient::list_candidate_files
pub(crate) fn reduce_to_latest_per_category<I>(records: I) -> CategoryMap
where
    I: IntoIterator<Item = RemoteFileRecord>,
{
    let mut map = CategoryMap::new();
    for record in records {
        let category = Category::classify(&record.name);
        let name = record.name.clone();
        if map.insert_if_absent(category.clone(), record) {
            tracing::debug!(%category, %name, "Selected most recent file for category");
        } else {
            tracing::debug!(%category, %name, "Skipping older file for category");
        }
    }
    map
}
