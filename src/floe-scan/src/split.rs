/// Splits `items` into exactly `num_groups` contiguous groups whose sizes
/// differ by at most one; the first `items.len() % num_groups` groups get the
/// extra element. Requesting more groups than items yields empty trailing
/// groups, which callers drop.
pub fn split_into_groups<T: Clone>(items: &[T], num_groups: usize) -> Vec<Vec<T>> {
    debug_assert!(num_groups > 0, "num_groups must be positive");
    let base = items.len() / num_groups;
    let extra = items.len() % num_groups;
    let mut groups = Vec::with_capacity(num_groups);
    let mut offset = 0;
    for index in 0..num_groups {
        let len = base + usize::from(index < extra);
        groups.push(items[offset..offset + len].to_vec());
        offset += len;
    }
    groups
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(10, 4, vec![3, 3, 2, 2])]
    #[case(10, 1, vec![10])]
    #[case(10, 10, vec![1; 10])]
    #[case(3, 8, vec![1, 1, 1, 0, 0, 0, 0, 0])]
    #[case(0, 4, vec![0; 4])]
    #[case(7, 3, vec![3, 2, 2])]
    fn group_sizes_match_near_equal_splitting(
        #[case] num_items: usize,
        #[case] num_groups: usize,
        #[case] expected: Vec<usize>,
    ) {
        let items: Vec<usize> = (0..num_items).collect();
        let groups = split_into_groups(&items, num_groups);
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, expected);
    }

    #[rstest]
    #[case(10, 4)]
    #[case(1, 1)]
    #[case(5, 7)]
    #[case(100, 9)]
    fn splitting_is_a_contiguous_partition(#[case] num_items: usize, #[case] num_groups: usize) {
        let items: Vec<usize> = (0..num_items).collect();
        let groups = split_into_groups(&items, num_groups);
        assert_eq!(groups.len(), num_groups);

        let flattened: Vec<usize> = groups.iter().flatten().copied().collect();
        assert_eq!(flattened, items);

        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        let max = sizes.iter().max().copied().unwrap_or(0);
        let min = sizes.iter().min().copied().unwrap_or(0);
        assert!(max - min <= 1);
    }
}
