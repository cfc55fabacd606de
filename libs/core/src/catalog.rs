use time::{Date, Duration, Time, macros::time};

use crate::message::{BookingSlot, Pack};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudioCatalog {
    slots: Vec<BookingSlot>,
    packs: Vec<Pack>,
}

impl StudioCatalog {
    pub fn new(slots: Vec<BookingSlot>, packs: Vec<Pack>) -> Self {
        Self { slots, packs }
    }

    pub fn demo(today: Date) -> Self {
        let day = |offset: i64| today.saturating_add(Duration::days(offset));
        let slots = vec![
            slot("slot-1", day(1), time!(10:00), time!(12:00), "Studio A", 90, true),
            slot("slot-2", day(1), time!(14:00), time!(16:00), "Studio B", 70, true),
            slot("slot-3", day(2), time!(18:00), time!(20:00), "Studio A", 100, true),
            slot("slot-4", day(3), time!(9:00), time!(11:00), "Cabine voix", 50, false),
        ];
        let packs = vec![
            Pack {
                id: "pack-5h".into(),
                name: "Pack Decouverte".into(),
                description: "5 heures de studio a utiliser sous 3 mois".into(),
                price: 200,
                hours: 5,
                savings: None,
                popular: false,
            },
            Pack {
                id: "pack-10h".into(),
                name: "Pack Createur".into(),
                description: "10 heures de studio a utiliser sous 6 mois".into(),
                price: 360,
                hours: 10,
                savings: Some(40),
                popular: true,
            },
            Pack {
                id: "pack-20h".into(),
                name: "Pack Pro".into(),
                description: "20 heures de studio a utiliser sous 12 mois".into(),
                price: 650,
                hours: 20,
                savings: Some(150),
                popular: false,
            },
        ];
        Self { slots, packs }
    }

    pub fn available_slots(&self) -> Vec<BookingSlot> {
        self.slots.iter().filter(|s| s.available).cloned().collect()
    }

    pub fn slot(&self, id: &str) -> Option<&BookingSlot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn packs(&self) -> &[Pack] {
        &self.packs
    }

    pub fn pack(&self, id: &str) -> Option<&Pack> {
        self.packs.iter().find(|p| p.id == id)
    }
}

fn slot(
    id: &str,
    date: Date,
    start_time: Time,
    end_time: Time,
    resource_name: &str,
    price: u32,
    available: bool,
) -> BookingSlot {
    BookingSlot {
        id: id.to_string(),
        date,
        start_time,
        end_time,
        resource_name: resource_name.to_string(),
        price,
        available,
    }
}
