//! Food-search request and response shapes, and the executor seam.
//!
//! The executor behind [`SearchExecutor`] is a long-running, blocking
//! operation (a browser session in production). The job runtime only relies
//! on the contract: a validated [`SearchRequest`] in, a [`SearchResponse`] or
//! an error out.

use std::fmt;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::job::JobData;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceRange {
    Low,
    Medium,
    High,
    #[default]
    Any,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CuisineType {
    Italian,
    Argentinian,
    Mexican,
    Asian,
    FastFood,
    Pizza,
    Sushi,
    Burger,
    #[default]
    Any,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietaryRestriction {
    Vegetarian,
    Vegan,
    GlutenFree,
    DairyFree,
    Keto,
    Halal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPreferences {
    pub cuisine_type: CuisineType,
    pub price_range: PriceRange,
    pub dietary_restrictions: Vec<DietaryRestriction>,
    /// Minutes.
    pub max_delivery_time: u32,
    /// 0.0 to 5.0.
    pub min_rating: f64,
    pub max_delivery_fee: Option<f64>,
}

impl Default for SearchPreferences {
    fn default() -> Self {
        Self {
            cuisine_type: CuisineType::Any,
            price_range: PriceRange::Any,
            dietary_restrictions: Vec::new(),
            max_delivery_time: 60,
            min_rating: 0.0,
            max_delivery_fee: None,
        }
    }
}

pub const MAX_RESULTS_LIMIT: u32 = 50;

fn default_max_results() -> u32 {
    10
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub location: String,
    #[serde(default)]
    pub preferences: SearchPreferences,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default)]
    pub search_query: String,
}

impl SearchRequest {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            preferences: SearchPreferences::default(),
            max_results: default_max_results(),
            search_query: String::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = query.into();
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_preferences(mut self, preferences: SearchPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if self.location.trim().is_empty() {
            return Err(JobError::Validation("location must not be empty".into()));
        }
        if !(1..=MAX_RESULTS_LIMIT).contains(&self.max_results) {
            return Err(JobError::Validation(format!(
                "max_results must be between 1 and {MAX_RESULTS_LIMIT}, got {}",
                self.max_results
            )));
        }
        let rating = self.preferences.min_rating;
        if !(0.0..=5.0).contains(&rating) {
            return Err(JobError::Validation(format!(
                "min_rating must be between 0 and 5, got {rating}"
            )));
        }
        Ok(())
    }

    /// Parse and validate the payload of a food-search job.
    pub fn from_job_data(data: &JobData) -> Result<Self, JobError> {
        let request: SearchRequest =
            serde_json::from_value(serde_json::Value::Object(data.clone()))
                .map_err(|err| JobError::Validation(format!("invalid search request: {err}")))?;
        request.validate()?;
        Ok(request)
    }

    /// Encode as a job payload.
    pub fn to_job_data(&self) -> Result<JobData, JobError> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(other) => Err(JobError::Validation(format!(
                "search request encoded as {other}, expected an object"
            ))),
            Err(err) => Err(JobError::Validation(err.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default = "yes")]
    pub available: bool,
}

fn yes() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestaurantResult {
    pub restaurant_name: String,
    #[serde(default)]
    pub cuisine_type: String,
    #[serde(default)]
    pub estimated_price: Option<f64>,
    #[serde(default)]
    pub delivery_time: String,
    #[serde(default)]
    pub delivery_fee: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
    pub url: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub menu_items: Vec<MenuItem>,
    #[serde(default = "yes")]
    pub is_open: bool,
    #[serde(default)]
    pub promotions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub location: String,
    pub total_found: usize,
    pub search_time: String,
    #[serde(default)]
    pub search_timestamp: String,
    #[serde(default)]
    pub browser_session_id: String,
}

/// Outcome reported by the executor.
///
/// `success == false` is a delegate-level outcome and still completes the
/// job; only an `Err` from [`SearchExecutor::search`] fails it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub results: Vec<RestaurantResult>,
    pub search_metadata: SearchMetadata,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Performs a food search. Blocking; called from the blocking pool.
pub trait SearchExecutor: Send + Sync + 'static {
    fn search(&self, request: &SearchRequest) -> anyhow::Result<SearchResponse>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

struct SampleRestaurant {
    name: &'static str,
    cuisine: &'static str,
    price: f64,
    delivery_time: &'static str,
    rating: f64,
    items: [(&'static str, f64, &'static str); 2],
}

const SAMPLE_RESTAURANTS: [SampleRestaurant; 3] = [
    SampleRestaurant {
        name: "Pizza Express",
        cuisine: "Italian",
        price: 2500.0,
        delivery_time: "25-35 min",
        rating: 4.5,
        items: [
            ("Margherita Pizza", 1800.0, "Classic tomato and mozzarella"),
            ("Pepperoni Pizza", 2200.0, "Pepperoni with mozzarella cheese"),
        ],
    },
    SampleRestaurant {
        name: "Burger House",
        cuisine: "Fast Food",
        price: 1800.0,
        delivery_time: "20-30 min",
        rating: 4.2,
        items: [
            ("Classic Burger", 1200.0, "Beef patty with lettuce and tomato"),
            ("Chicken Burger", 1100.0, "Grilled chicken breast burger"),
        ],
    },
    SampleRestaurant {
        name: "Sushi Tokyo",
        cuisine: "Asian",
        price: 3500.0,
        delivery_time: "35-45 min",
        rating: 4.7,
        items: [
            ("Salmon Roll", 800.0, "Fresh salmon with avocado"),
            ("Tuna Sashimi", 1200.0, "Fresh tuna slices"),
        ],
    },
];

/// Deterministic executor returning a fixed set of restaurants.
#[derive(Clone, Copy, Debug, Default)]
pub struct SampleSearchExecutor;

impl SampleSearchExecutor {
    fn restaurant(sample: &SampleRestaurant) -> RestaurantResult {
        RestaurantResult {
            restaurant_name: sample.name.to_string(),
            cuisine_type: sample.cuisine.to_string(),
            estimated_price: Some(sample.price),
            delivery_time: sample.delivery_time.to_string(),
            delivery_fee: Some(150.0),
            rating: Some(sample.rating),
            url: format!(
                "https://rappi.com.ar/restaurants/{}",
                sample.name.to_lowercase().replace(' ', "-")
            ),
            image_url: String::new(),
            address: String::new(),
            menu_items: sample
                .items
                .iter()
                .map(|(name, price, description)| MenuItem {
                    name: name.to_string(),
                    price: Some(*price),
                    description: description.to_string(),
                    image_url: String::new(),
                    available: true,
                })
                .collect(),
            is_open: true,
            promotions: vec!["Free delivery on orders over $2000".to_string()],
        }
    }
}

impl SearchExecutor for SampleSearchExecutor {
    fn search(&self, request: &SearchRequest) -> anyhow::Result<SearchResponse> {
        let started = Instant::now();
        let started_at = Utc::now();

        let results: Vec<RestaurantResult> = SAMPLE_RESTAURANTS
            .iter()
            .take(request.max_results as usize)
            .map(Self::restaurant)
            .collect();

        Ok(SearchResponse {
            success: true,
            search_metadata: SearchMetadata {
                location: request.location.clone(),
                total_found: results.len(),
                search_time: format!("{:?}", started.elapsed()),
                search_timestamp: started_at.to_rfc3339(),
                browser_session_id: format!("sample_{}", started_at.timestamp()),
            },
            results,
            error_message: None,
        })
    }

    fn name(&self) -> &str {
        "sample"
    }
}

impl fmt::Display for SearchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.search_query.is_empty() {
            write!(f, "{} (max {})", self.location, self.max_results)
        } else {
            write!(
                f,
                "{:?} in {} (max {})",
                self.search_query, self.location, self.max_results
            )
        }
    }
}
