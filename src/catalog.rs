use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::message_store::normalize_city;

/// The known city catalog, consumed as an opaque set of valid names.
/// Free-form cities are still accepted at post time; membership here only
/// drives normalization in stats.
const KNOWN_CITIES: &[&str] = &[
    "Agra",
    "Ahmedabad",
    "Bangalore",
    "Bhopal",
    "Chandigarh",
    "Chennai",
    "Coimbatore",
    "Dehradun",
    "Delhi",
    "Faridabad",
    "Ghaziabad",
    "Gurgaon",
    "Guwahati",
    "Hyderabad",
    "Indore",
    "Jaipur",
    "Kanpur",
    "Kochi",
    "Kolkata",
    "Lucknow",
    "Ludhiana",
    "Mumbai",
    "Mysore",
    "Nagpur",
    "Nashik",
    "Navi Mumbai",
    "New Delhi",
    "Noida",
    "Patna",
    "Pune",
    "Surat",
    "Thane",
    "Vadodara",
    "Visakhapatnam",
];

static KNOWN_SET: Lazy<HashSet<String>> =
    Lazy::new(|| KNOWN_CITIES.iter().map(|c| normalize_city(c)).collect());

pub fn is_known(city: &str) -> bool {
    KNOWN_SET.contains(&normalize_city(city))
}
