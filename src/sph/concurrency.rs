use crate::error::SphResult;

pub use internal::*;

/**
 * Runs a fallible per-particle computation for every index. The error of the lowest failing
 * index is returned, independent of the order in which workers finished.
 */
pub fn par_try_map_indices<T: Send, F: Fn(usize) -> SphResult<T> + Send + Sync>(n: usize, f: F) -> SphResult<Vec<T>> {
    par_map_indices(n, f).into_iter().collect()
}

#[cfg(not(feature = "parallel"))]
mod internal {
    pub fn par_map_indices<T: Send, F: Fn(usize) -> T + Send + Sync>(n: usize, f: F) -> Vec<T> {
        (0..n).map(f).collect()
    }

    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.iter_mut().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }
}

#[cfg(feature = "parallel")]
mod internal {
    use rayon::prelude::*;

    /** Results are in index order. */
    pub fn par_map_indices<T: Send, F: Fn(usize) -> T + Send + Sync>(n: usize, f: F) -> Vec<T> {
        (0..n).into_par_iter().map(f).collect()
    }

    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.into_par_iter().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }
}

#[test]
fn map_keeps_index_order() {
    let squares = par_map_indices(1000, |i| i * i);
    assert!(squares.iter().enumerate().all(|(i, &s)| s == i * i));

    let mut values = vec![0usize; 257];
    par_iter_mut1(&mut values, |i, v| *v = 2 * i);
    assert!(values.iter().enumerate().all(|(i, &v)| v == 2 * i));
}

#[test]
fn try_map_reports_lowest_failing_index() {
    use crate::error::SphError;

    let result = par_try_map_indices(500, |i| {
        if i % 97 == 13 {
            Err(SphError::invalid_input(format!("{}", i)))
        } else {
            Ok(i)
        }
    });
    match result {
        Err(SphError::InvalidInput(message)) => assert_eq!(message, "13"),
        other => panic!("expected the error of index 13, got {:?}", other),
    }

    assert_eq!(par_try_map_indices(4, Ok).unwrap(), vec![0, 1, 2, 3]);
}
