use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fitforge_workouts::models::{VolumeSummary, WorkoutSet};

fn make_sets(count: usize, exercises: usize) -> Vec<WorkoutSet> {
    let now = Utc::now();
    (0..count)
        .map(|i| WorkoutSet {
            id: format!("set-{}", i),
            workout_exercise_id: format!("we-{}", i % exercises),
            session_id: "session-1".to_string(),
            exercise_id: format!("exercise-{}", i % exercises),
            user_id: "user-1".to_string(),
            set_number: (i / exercises) as u32 + 1,
            reps: 5 + (i % 8) as u32,
            weight: 40.0 + (i % 20) as f64 * 2.5,
            form_score: None,
            perceived_exertion: None,
            equipment: None,
            // Roughly one in ten sets left unfinished
            completed: i % 10 != 0,
            is_personal_record: false,
            created_at: now,
            completed_at: None,
        })
        .collect()
}

fn benchmark_volume(c: &mut Criterion) {
    // A long session: 8 exercises, 5 sets each
    let typical = make_sets(40, 8);
    // History-sized input
    let large = make_sets(10_000, 12);

    let mut group = c.benchmark_group("volume_summary");

    group.bench_function("session_40_sets", |b| {
        b.iter(|| VolumeSummary::from_sets(black_box(&typical)))
    });

    group.bench_function("per_exercise_40_sets", |b| {
        b.iter(|| {
            VolumeSummary::from_sets(
                black_box(&typical)
                    .iter()
                    .filter(|s| s.workout_exercise_id == "we-3"),
            )
        })
    });

    group.bench_function("history_10k_sets", |b| {
        b.iter(|| VolumeSummary::from_sets(black_box(&large)))
    });

    group.finish();
}

criterion_group!(benches, benchmark_volume);
criterion_main!(benches);
