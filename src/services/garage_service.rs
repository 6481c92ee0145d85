use rand::{Rng, rng, seq::IndexedRandom};
use tracing::info;

use crate::{api::CarInput, error::ServiceError, state::SharedState};

/// Cars created by one click on "generate".
pub const DEFAULT_BATCH: usize = 100;

const BRANDS: [(&str, [&str; 5]); 10] = [
    ("Tesla", ["Model S", "Model 3", "Model X", "Model Y", "Roadster"]),
    ("BMW", ["M3", "M5", "X5", "i8", "Z4"]),
    ("Mercedes", ["AMG GT", "C-Class", "E-Class", "S-Class", "G-Wagon"]),
    ("Audi", ["R8", "A4", "Q7", "TT", "RS6"]),
    ("Toyota", ["Supra", "Corolla", "Camry", "Prius", "GR86"]),
    ("Honda", ["Civic", "Accord", "NSX", "S2000", "CR-V"]),
    ("Ford", ["Mustang", "GT", "Focus", "F-150", "Bronco"]),
    ("Nissan", ["GT-R", "370Z", "Skyline", "Leaf", "Silvia"]),
    ("Porsche", ["911", "Cayenne", "Taycan", "Panamera", "Boxster"]),
    ("Lamborghini", ["Aventador", "Huracan", "Urus", "Countach", "Diablo"]),
];

/// Random "Brand Model" name.
pub fn random_name<R: Rng>(rng: &mut R) -> String {
    let (brand, models) = BRANDS[rng.random_range(0..BRANDS.len())];
    let model = models.choose(rng).copied().unwrap_or(models[0]);
    format!("{brand} {model}")
}

/// Random `#rrggbb` color.
pub fn random_color<R: Rng>(rng: &mut R) -> String {
    format!("#{:06x}", rng.random_range(0..=0xff_ffffu32))
}

/// `count` random car inputs.
pub fn random_cars<R: Rng>(rng: &mut R, count: usize) -> Vec<CarInput> {
    (0..count)
        .map(|_| CarInput::new(random_name(rng), random_color(rng)))
        .collect()
}

/// Fill the garage with `count` random cars, returning how many were created.
pub async fn generate_random_cars(
    state: &SharedState,
    count: usize,
) -> Result<usize, ServiceError> {
    let inputs = random_cars(&mut rng(), count);
    let created = state.cars().create_cars(inputs).await?;
    info!(requested = count, created, "generated random cars");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};
    use validator::Validate;

    use super::*;
    use crate::test_support::{FakeEngine, MemoryGarage, MemoryWinners, test_state};

    #[test]
    fn generated_inputs_are_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for input in random_cars(&mut rng, 200) {
            assert!(input.validate().is_ok(), "{input:?}");
            let brand = input.name.split(' ').next().unwrap();
            assert!(BRANDS.iter().any(|(known, _)| *known == brand));
        }
    }

    #[tokio::test]
    async fn generate_fills_the_garage_and_reloads_the_first_page() {
        let garage = MemoryGarage::default();
        let state = test_state(FakeEngine::new(), garage.clone(), MemoryWinners::default());
        state.cars().set_page(3);

        let created = generate_random_cars(&state, DEFAULT_BATCH).await.unwrap();

        assert_eq!(created, DEFAULT_BATCH);
        assert_eq!(garage.cars().len(), DEFAULT_BATCH);
        let snapshot = state.cars().snapshot();
        assert_eq!(snapshot.page, 1);
        assert_eq!(snapshot.total, DEFAULT_BATCH);
        assert_eq!(snapshot.cars.len(), 7);
    }
}
