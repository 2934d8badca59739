use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group<K, T> {
    pub key: K,
    pub items: Vec<T>,
}

/// Groups in order of first key appearance; items keep input order.
pub fn group_by_ordered<T, K, F>(items: impl IntoIterator<Item = T>, mut key: F) -> Vec<Group<K, T>>
where
    K: Eq + Hash + Clone,
    F: FnMut(&T) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Group<K, T>> = Vec::new();
    for item in items {
        let k = key(&item);
        match index.get(&k) {
            Some(&i) => groups[i].items.push(item),
            None => {
                index.insert(k.clone(), groups.len());
                groups.push(Group {
                    key: k,
                    items: vec![item],
                });
            }
        }
    }
    groups
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixRow<R, C, V> {
    pub key: R,
    pub cells: Vec<MatrixCell<C, V>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixCell<C, V> {
    pub key: C,
    pub value: V,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Matrix<R, C, V> {
    pub rows: Vec<MatrixRow<R, C, V>>,
    /// Triples dropped because their cell was already filled.
    pub collisions: usize,
    /// Triples whose row or column key is outside the fixed dimensions.
    pub out_of_range: usize,
}

#[cfg(test)]
impl<R: PartialEq, C: PartialEq, V> Matrix<R, C, V> {
    pub fn get(&self, row: &R, col: &C) -> Option<&V> {
        self.rows
            .iter()
            .find(|r| &r.key == row)?
            .cells
            .iter()
            .find(|c| &c.key == col)
            .map(|c| &c.value)
    }
}

/// Builds a total matrix: every `(row, col)` pair appears exactly once,
/// filled with `default` unless a triple supplies a value. The first triple
/// for a cell wins.
pub fn build_matrix<R, C, V>(
    rows: &[R],
    cols: &[C],
    triples: impl IntoIterator<Item = (R, C, V)>,
    default: V,
) -> Matrix<R, C, V>
where
    R: Eq + Hash + Clone,
    C: Eq + Hash + Clone,
    V: Clone,
{
    let row_index: HashMap<&R, usize> = rows.iter().enumerate().map(|(i, r)| (r, i)).collect();
    let col_index: HashMap<&C, usize> = cols.iter().enumerate().map(|(i, c)| (c, i)).collect();

    let mut grid: Vec<Vec<Option<V>>> = vec![vec![None; cols.len()]; rows.len()];
    let mut collisions = 0;
    let mut out_of_range = 0;
    for (r, c, v) in triples {
        let (Some(&ri), Some(&ci)) = (row_index.get(&r), col_index.get(&c)) else {
            out_of_range += 1;
            continue;
        };
        let cell = &mut grid[ri][ci];
        if cell.is_some() {
            collisions += 1;
        } else {
            *cell = Some(v);
        }
    }

    let rows = rows
        .iter()
        .zip(grid)
        .map(|(rk, cells)| MatrixRow {
            key: rk.clone(),
            cells: cols
                .iter()
                .zip(cells)
                .map(|(ck, v)| MatrixCell {
                    key: ck.clone(),
                    value: v.unwrap_or_else(|| default.clone()),
                })
                .collect(),
        })
        .collect();

    Matrix {
        rows,
        collisions,
        out_of_range,
    }
}

/// Left join preserving the left list's cardinality exactly. Each left item
/// is paired with the first right item sharing its key, if any.
pub fn left_join<'r, L, R, K, FL, FR>(
    left: impl IntoIterator<Item = L>,
    right: &'r [R],
    left_key: FL,
    right_key: FR,
) -> Vec<(L, Option<&'r R>)>
where
    K: Eq + Hash,
    FL: Fn(&L) -> K,
    FR: Fn(&R) -> K,
{
    let mut index: HashMap<K, &'r R> = HashMap::new();
    for r in right {
        index.entry(right_key(r)).or_insert(r);
    }
    left.into_iter()
        .map(|l| {
            let m = index.get(&left_key(&l)).copied();
            (l, m)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_follow_first_appearance() {
        let items = vec![("mid", 1), ("final", 2), ("mid", 3), ("unit", 4), ("final", 5)];
        let groups = group_by_ordered(items, |(k, _)| *k);
        let keys: Vec<&str> = groups.iter().map(|g| g.key).collect();
        assert_eq!(keys, vec!["mid", "final", "unit"]);
        let mid: Vec<i32> = groups[0].items.iter().map(|(_, v)| *v).collect();
        assert_eq!(mid, vec![1, 3]);
    }

    #[test]
    fn matrix_is_total_and_first_write_wins() {
        let days = vec!["Mon", "Tue"];
        let periods = vec![1, 2, 3];
        let m = build_matrix(
            &days,
            &periods,
            vec![
                ("Mon", 1, Some("Math")),
                ("Mon", 1, Some("Art")),
                ("Tue", 3, Some("Science")),
                ("Sun", 1, Some("Nope")),
            ],
            None,
        );
        assert_eq!(m.rows.len(), 2);
        for row in &m.rows {
            assert_eq!(row.cells.len(), periods.len());
        }
        assert_eq!(m.get(&"Mon", &1), Some(&Some("Math")));
        assert_eq!(m.get(&"Mon", &2), Some(&None));
        assert_eq!(m.get(&"Tue", &3), Some(&Some("Science")));
        assert_eq!(m.collisions, 1);
        assert_eq!(m.out_of_range, 1);
    }

    #[test]
    fn left_join_keeps_left_cardinality() {
        let roster = vec![1, 2, 3];
        let none: Vec<(i32, &str)> = vec![];
        assert_eq!(left_join(roster.clone(), &none, |l| *l, |r| r.0).len(), 3);

        let dupes = vec![(2, "first"), (2, "second"), (9, "stranger")];
        let joined = left_join(roster, &dupes, |l| *l, |r| r.0);
        assert_eq!(joined.len(), 3);
        assert!(joined[0].1.is_none());
        assert_eq!(joined[1].1.map(|r| r.1), Some("first"));
        assert!(joined[2].1.is_none());
    }
}
