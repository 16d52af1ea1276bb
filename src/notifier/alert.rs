//! Structured alert messages built from listing snapshots.

use crate::source::ListingSnapshot;

/// Embed colour of a release alert.
pub const RELEASE_COLOUR: u32 = 0xFFFFFF;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlertKind {
    Sale,
    Release,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl AlertField {
    fn new(name: &str, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            inline,
        }
    }
}

/// A message for a group's alert channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub listing_id: i64,
    pub title: String,
    pub url: String,
    pub image_url: String,
    pub colour: u32,
    pub fields: Vec<AlertField>,
}

impl Alert {
    /// Alert for a listing whose discount crossed a group's threshold.
    pub fn sale(snapshot: &ListingSnapshot) -> Self {
        let mut fields = vec![
            AlertField::new("Original Price", &snapshot.initial_price, true),
            AlertField::new("Sale Price", &snapshot.final_price, true),
        ];
        if snapshot.review_count > 0 {
            fields.push(AlertField::new(
                "Reviews",
                snapshot.review_count.to_string(),
                true,
            ));
        }
        if !snapshot.description.is_empty() {
            fields.push(AlertField::new("Description", &snapshot.description, false));
        }

        Self {
            kind: AlertKind::Sale,
            listing_id: snapshot.listing_id,
            title: format!(
                "{} is on sale for {}% off!",
                snapshot.name, snapshot.discount
            ),
            url: snapshot.store_url(),
            image_url: snapshot.image_url.clone(),
            colour: discount_colour(snapshot.discount),
            fields,
        }
    }

    /// Alert for a listing that left the coming-soon state.
    pub fn release(snapshot: &ListingSnapshot) -> Self {
        let price = if snapshot.final_price.is_empty() {
            "Free".to_string()
        } else {
            snapshot.final_price.clone()
        };
        let mut fields = vec![AlertField::new("Price", price, false)];
        if !snapshot.description.is_empty() {
            fields.push(AlertField::new("Description", &snapshot.description, false));
        }

        Self {
            kind: AlertKind::Release,
            listing_id: snapshot.listing_id,
            title: format!("{} has released on Steam!", snapshot.name),
            url: snapshot.store_url(),
            image_url: snapshot.image_url.clone(),
            colour: RELEASE_COLOUR,
            fields,
        }
    }
}

/// Embed colour for a discount band, green for small discounts through red for deep ones.
pub fn discount_colour(discount: i32) -> u32 {
    const BANDS: [(i32, u32); 13] = [
        (5, 0x0bff33),
        (10, 0x44fdd2),
        (15, 0x44fdfd),
        (20, 0x44dbfd),
        (25, 0x44b6fd),
        (30, 0x448bfd),
        (35, 0x445afd),
        (40, 0x8544fd),
        (45, 0xb044fd),
        (50, 0xe144fd),
        (55, 0xfd44de),
        (60, 0xff23a7),
        (99, 0xff0000),
    ];

    BANDS
        .iter()
        .find(|(at_most, _)| discount <= *at_most)
        .map_or(0xFFFFFF, |(_, colour)| *colour)
}
