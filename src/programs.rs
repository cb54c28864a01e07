use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declares a closed enum backed by an explicit `(variant, code, label)` table.
///
/// Codes are what travels over the wire and lives in data files, labels are
/// what the app displays. Lookups only ever go through the table.
macro_rules! code_table {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => ($code:literal, $label:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const TABLE: &'static [($name, &'static str, &'static str)] =
                &[$(($name::$variant, $code, $label)),+];

            pub fn code(self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Case-insensitive lookup by code.
            pub fn from_code(code: &str) -> Option<Self> {
                let code = code.trim();
                Self::TABLE
                    .iter()
                    .find(|(_, c, _)| c.eq_ignore_ascii_case(code))
                    .map(|(variant, _, _)| *variant)
            }

            pub fn all() -> impl Iterator<Item = Self> {
                Self::TABLE.iter().map(|(variant, _, _)| *variant)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.code())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownCode;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_code(s).ok_or_else(|| UnknownCode {
                    kind: stringify!($name),
                    code: s.to_string(),
                })
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.code())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let code = String::deserialize(deserializer)?;
                code.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind} code: {code:?}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: String,
}

code_table! {
    pub enum Category {
        Cash => ("CASH", "빈곤 완화"),
        Health => ("HEALTH", "보건, 의료"),
        Care => ("CARE", "돌봄, 요양"),
        Dementia => ("DEMENTIA", "치매 관련"),
        Employment => ("EMPLOYMENT", "고용, 일자리"),
        Leisure => ("LEISURE", "사회, 여가문화 활동"),
        Housing => ("HOUSING", "주거 지원"),
        Other => ("OTHER", "기타"),
    }
}

code_table! {
    pub enum OperatingEntityType {
        Central => ("CENTRAL", "중앙부처"),
        Local => ("LOCAL", "지자체"),
    }
}

code_table! {
    pub enum Gender {
        Any => ("ANY", "무관"),
        Male => ("MALE", "남성"),
        Female => ("FEMALE", "여성"),
    }
}

code_table! {
    pub enum MaritalStatus {
        Any => ("ANY", "무관"),
        Single => ("SINGLE", "미혼"),
        Married => ("MARRIED", "기혼"),
        DivorcedOrBereaved => ("DIVORCED_OR_BEREAVED", "이혼/사별"),
    }
}

code_table! {
    pub enum EducationLevel {
        Any => ("ANY", "무관"),
        Highschool => ("HIGHSCHOOL", "고졸"),
        Associate => ("ASSOCIATE", "전문대졸"),
        Bachelor => ("BACHELOR", "학사"),
        Master => ("MASTER", "석사"),
        Phd => ("PHD", "박사"),
    }
}

code_table! {
    pub enum EmploymentStatus {
        Any => ("ANY", "무관"),
        Employed => ("EMPLOYED", "재직자"),
        Unemployed => ("UNEMPLOYED", "미취업자"),
        SelfEmployed => ("SELF_EMPLOYED", "자영업자"),
    }
}

code_table! {
    /// A user's reaction to a program.
    pub enum LikeStatus {
        Like => ("LIKE", "좋아요"),
        Dislike => ("DISLIKE", "관심 없음"),
    }
}

code_table! {
    /// Ordering of the text search listing.
    pub enum SortMode {
        Rank => ("RANK", "관련도순"),
        Latest => ("LATEST", "최신순"),
    }
}

code_table! {
    /// Ordering of a user's bookmark listing.
    pub enum BookmarkSort {
        Latest => ("LATEST", "최신순"),
        Deadline => ("DEADLINE", "기한순"),
    }
}

impl Default for BookmarkSort {
    fn default() -> Self {
        BookmarkSort::Latest
    }
}

/// Eligibility requirements of a program. `None` means "no requirement".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    #[serde(default)]
    pub min_age: Option<u32>,
    #[serde(default)]
    pub max_age: Option<u32>,
    #[serde(default)]
    pub min_household: Option<u32>,
    #[serde(default)]
    pub max_household: Option<u32>,
    #[serde(default)]
    pub min_income: Option<u64>,
    #[serde(default)]
    pub max_income: Option<u64>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub marital_status: Option<MaritalStatus>,
    #[serde(default)]
    pub education: Option<EducationLevel>,
    #[serde(default)]
    pub employment: Option<EmploymentStatus>,
}

/// Facts about a user that eligibility is checked against.
///
/// Maintained by the profile service; unknown facts never exclude a program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub household_size: Option<u32>,
    #[serde(default)]
    pub household_income: Option<u64>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub marital_status: Option<MaritalStatus>,
    #[serde(default)]
    pub education: Option<EducationLevel>,
    #[serde(default)]
    pub employment: Option<EmploymentStatus>,
}

fn in_range<T: PartialOrd + Copy>(value: Option<T>, min: Option<T>, max: Option<T>) -> bool {
    let Some(value) = value else {
        return true;
    };
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

fn matches_code<T: PartialEq + Copy>(required: Option<T>, any: T, actual: Option<T>) -> bool {
    match (required, actual) {
        (None, _) | (_, None) => true,
        (Some(required), _) if required == any => true,
        (Some(required), Some(actual)) => required == actual,
    }
}

impl Eligibility {
    pub fn admits(&self, profile: &UserProfile) -> bool {
        let region_ok = match (&self.region, &profile.region) {
            (Some(required), Some(actual)) => actual.contains(required.trim()),
            _ => true,
        };

        region_ok
            && in_range(profile.age, self.min_age, self.max_age)
            && in_range(profile.household_size, self.min_household, self.max_household)
            && in_range(profile.household_income, self.min_income, self.max_income)
            && matches_code(self.gender, Gender::Any, profile.gender)
            && matches_code(self.marital_status, MaritalStatus::Any, profile.marital_status)
            && matches_code(self.education, EducationLevel::Any, profile.education)
            && matches_code(self.employment, EmploymentStatus::Any, profile.employment)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: u64,
    pub uuid: String,
    pub category: Category,
    pub title: String,
    pub summary: String,
    pub details: String,
    pub preview: String,
    pub operating_entity: String,
    pub operating_entity_type: OperatingEntityType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,

    #[serde(default)]
    pub eligibility: Eligibility,

    #[serde(default)]
    pub apply_start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub apply_end_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A program as seen by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramView {
    #[serde(flatten)]
    pub program: Program,

    #[serde(default)]
    pub category_value: String,

    #[serde(default)]
    pub is_bookmarked: bool,

    #[serde(default)]
    pub like_status: Option<LikeStatus>,

    /// Why the program was recommended, only set on personalized feeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ProgramView {
    pub fn new(program: Program, is_bookmarked: bool, like_status: Option<LikeStatus>) -> Self {
        Self {
            category_value: program.category.label().to_string(),
            program,
            is_bookmarked,
            like_status,
            reason: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.program.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub category: String,
    pub value: String,
}

impl From<Category> for CategoryEntry {
    fn from(category: Category) -> Self {
        Self {
            category: category.code().to_string(),
            value: category.label().to_string(),
        }
    }
}

/// One onboarding rating, `score` is 1..=5 and 0 means unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub id: u64,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid page request: page {page}, size {size} (size must be between 1 and {max_size})")]
pub struct InvalidPageRequest {
    pub page: i64,
    pub size: i64,
    pub max_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    /// Validate raw request numbers against `0 <= page` and `1 <= size <= max_size`.
    pub fn validated(page: i64, size: i64, max_size: u32) -> Result<Self, InvalidPageRequest> {
        let invalid = || InvalidPageRequest {
            page,
            size,
            max_size,
        };

        if page < 0 || size < 1 || size > max_size as i64 {
            return Err(invalid());
        }

        Ok(Self {
            page: u32::try_from(page).map_err(|_| invalid())?,
            size: size as u32,
        })
    }

    pub fn first(size: u32) -> Self {
        Self { page: 0, size }
    }

    pub fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
    pub is_first: bool,
    pub is_last: bool,
}

impl<T> Page<T> {
    fn with_content(content: Vec<T>, request: PageRequest, total_elements: u64) -> Self {
        let size = request.size.max(1) as u64;
        let total_pages = total_elements.div_ceil(size) as u32;

        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages,
            is_first: request.page == 0,
            is_last: request.page as u64 + 1 >= total_pages as u64,
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::with_content(Vec::new(), request, 0)
    }

    /// Cut the requested page out of a fully ordered result.
    pub fn paginate<I>(ordered: I, request: PageRequest) -> Self
    where
        I: ExactSizeIterator<Item = T>,
    {
        let total = ordered.len() as u64;
        let content = ordered
            .skip(request.offset().min(total) as usize)
            .take(request.size as usize)
            .collect();

        Self::with_content(content, request, total)
    }

    /// Like [`Page::map`], dropping items `f` rejects. Paging metadata is kept.
    pub fn filter_map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> Option<U>,
    {
        Page {
            content: self.content.into_iter().filter_map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            is_first: self.is_first,
            is_last: self.is_last,
        }
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            is_first: self.is_first,
            is_last: self.is_last,
        }
    }
}
